use crate::ast::*;
use crate::error::{ParseError, ParseResult};
use crate::tokenizer::{tokenize, unquote, Token};

/// Recursive-descent parser for response-check formulas
pub struct Parser<'src> {
    tokens: Vec<(Token<'src>, std::ops::Range<usize>)>,
    pos: usize,
    source_len: usize,
    depth: usize,
}

/// Deepest tree a check may build: groups, prefixes, calls, member access
/// and operator chains each add a level.
pub const MAX_DEPTH: usize = 64;

/// Parse a complete formula
pub fn parse(source: &str) -> ParseResult<Expression> {
    let mut parser = Parser::new(source)?;
    parser.parse_formula()
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> ParseResult<Self> {
        let tokens = tokenize(source)?;
        Ok(Self {
            tokens,
            pos: 0,
            source_len: source.len(),
            depth: 0,
        })
    }

    /// Parse one expression and require that it consumes all input
    pub fn parse_formula(&mut self) -> ParseResult<Expression> {
        let expr = self.parse_expression()?;

        if let Some((token, span)) = self.peek() {
            return Err(ParseError::unexpected_token(
                span.start,
                "end of input",
                token.to_string(),
            ));
        }

        Ok(expr)
    }

    /// Parse an expression with full operator precedence
    fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_or_expression()
    }

    /// Parse OR expression (lowest precedence)
    fn parse_or_expression(&mut self) -> ParseResult<Expression> {
        self.parse_chain(Self::parse_and_expression, |p| {
            p.match_token(Token::Or).then_some(BinaryOp::Or)
        })
    }

    /// Parse AND expression
    fn parse_and_expression(&mut self) -> ParseResult<Expression> {
        self.parse_chain(Self::parse_equality_expression, |p| {
            p.match_token(Token::And).then_some(BinaryOp::And)
        })
    }

    /// Parse equality expression (== !=)
    fn parse_equality_expression(&mut self) -> ParseResult<Expression> {
        self.parse_chain(Self::parse_comparison_expression, Self::match_equality_op)
    }

    /// Parse comparison expression (< > <= >=)
    fn parse_comparison_expression(&mut self) -> ParseResult<Expression> {
        self.parse_chain(Self::parse_additive_expression, Self::match_comparison_op)
    }

    /// Parse additive expression (+ -)
    fn parse_additive_expression(&mut self) -> ParseResult<Expression> {
        self.parse_chain(Self::parse_multiplicative_expression, Self::match_additive_op)
    }

    /// Parse multiplicative expression (* / %)
    fn parse_multiplicative_expression(&mut self) -> ParseResult<Expression> {
        self.parse_chain(Self::parse_unary_expression, Self::match_multiplicative_op)
    }

    /// Left-associative operator chain. Every link deepens the tree by one.
    fn parse_chain(
        &mut self,
        operand: fn(&mut Self) -> ParseResult<Expression>,
        operator: fn(&mut Self) -> Option<BinaryOp>,
    ) -> ParseResult<Expression> {
        let start = self.current_pos();
        let mut left = operand(self)?;
        let mut links = 0;

        while let Some(op) = operator(self) {
            self.descend()?;
            links += 1;
            let right = operand(self)?;
            left = self.binary(left, op, right, start);
        }

        self.depth -= links;
        Ok(left)
    }

    /// Parse prefix operators (! -)
    fn parse_unary_expression(&mut self) -> ParseResult<Expression> {
        let start = self.current_pos();

        let operator = if self.match_token(Token::Bang) {
            UnaryOp::Not
        } else if self.match_token(Token::Minus) {
            UnaryOp::Negate
        } else {
            return self.parse_postfix_expression();
        };

        self.descend()?;
        let operand = self.parse_unary_expression()?;
        self.depth -= 1;
        Ok(Expression::Unary {
            operator,
            operand: Box::new(operand),
            span: Span::new(start, self.previous_end()),
        })
    }

    /// Parse member access chains (a.b.c)
    fn parse_postfix_expression(&mut self) -> ParseResult<Expression> {
        let start = self.current_pos();
        let mut expr = self.parse_primary_expression()?;
        let mut links = 0;

        while self.match_token(Token::Dot) {
            self.descend()?;
            links += 1;
            let property = self.expect_ident()?;
            expr = Expression::Member {
                object: Box::new(expr),
                property,
                span: Span::new(start, self.previous_end()),
            };
        }

        self.depth -= links;
        Ok(expr)
    }

    /// Parse primary expression (literals, variables, calls, groups)
    fn parse_primary_expression(&mut self) -> ParseResult<Expression> {
        let start = self.current_pos();

        let Some((token, range)) = self.peek().cloned() else {
            return Err(ParseError::unexpected_eof(self.source_len));
        };

        match token {
            Token::String(raw) => {
                self.advance();
                Ok(Expression::Literal {
                    value: unquote(raw),
                    span: Span::new(start, range.end),
                })
            }
            Token::Number(n) => {
                self.advance();
                let value = n
                    .parse::<f64>()
                    .map_err(|_| ParseError::invalid_number(start, n))?;
                Ok(Expression::Number {
                    value,
                    span: Span::new(start, range.end),
                })
            }
            Token::True | Token::False => {
                self.advance();
                Ok(Expression::Boolean {
                    value: token == Token::True,
                    span: Span::new(start, range.end),
                })
            }
            Token::Null => {
                self.advance();
                Ok(Expression::Null {
                    span: Span::new(start, range.end),
                })
            }
            Token::Ident(name) => {
                self.advance();

                // Check for function call
                if self.check(Token::LParen) {
                    return self.parse_function_call(name.to_string(), start);
                }

                Ok(Expression::Variable {
                    name: name.to_string(),
                    span: Span::new(start, range.end),
                })
            }
            Token::LParen => {
                self.advance();
                self.descend()?;
                let inner = self.parse_expression()?;
                self.expect(Token::RParen)?;
                self.depth -= 1;
                Ok(inner)
            }
            other => Err(ParseError::unexpected_token(
                range.start,
                "expression",
                other.to_string(),
            )),
        }
    }

    fn parse_function_call(&mut self, function: String, start: usize) -> ParseResult<Expression> {
        self.expect(Token::LParen)?;
        self.descend()?;

        let mut arguments = Vec::new();
        if !self.check(Token::RParen) {
            loop {
                arguments.push(self.parse_expression()?);
                if !self.match_token(Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;
        self.depth -= 1;

        Ok(Expression::Call {
            function,
            arguments,
            span: Span::new(start, self.previous_end()),
        })
    }

    fn binary(&self, left: Expression, operator: BinaryOp, right: Expression, start: usize) -> Expression {
        Expression::Binary {
            left: Box::new(left),
            operator,
            right: Box::new(right),
            span: Span::new(start, self.previous_end()),
        }
    }

    // Helper methods for matching operators

    fn match_equality_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Token::EqualsEquals) {
            Some(BinaryOp::Equals)
        } else if self.match_token(Token::NotEquals) {
            Some(BinaryOp::NotEquals)
        } else {
            None
        }
    }

    fn match_comparison_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Token::LessThanEquals) {
            Some(BinaryOp::LessThanOrEqual)
        } else if self.match_token(Token::GreaterThanEquals) {
            Some(BinaryOp::GreaterThanOrEqual)
        } else if self.match_token(Token::LAngle) {
            Some(BinaryOp::LessThan)
        } else if self.match_token(Token::RAngle) {
            Some(BinaryOp::GreaterThan)
        } else {
            None
        }
    }

    fn match_additive_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Token::Plus) {
            Some(BinaryOp::Add)
        } else if self.match_token(Token::Minus) {
            Some(BinaryOp::Subtract)
        } else {
            None
        }
    }

    fn match_multiplicative_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Token::Star) {
            Some(BinaryOp::Multiply)
        } else if self.match_token(Token::Slash) {
            Some(BinaryOp::Divide)
        } else if self.match_token(Token::Percent) {
            Some(BinaryOp::Modulo)
        } else {
            None
        }
    }

    // Helper methods

    fn descend(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::too_deep(self.current_pos(), MAX_DEPTH));
        }
        Ok(())
    }

    fn peek(&self) -> Option<&(Token<'src>, std::ops::Range<usize>)> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&(Token<'src>, std::ops::Range<usize>)> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn current_pos(&self) -> usize {
        self.peek().map(|(_, span)| span.start).unwrap_or(self.source_len)
    }

    fn previous_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|(_, span)| span.end)
            .unwrap_or(0)
    }

    fn check(&self, token: Token) -> bool {
        if let Some((t, _)) = self.peek() {
            std::mem::discriminant(t) == std::mem::discriminant(&token)
        } else {
            false
        }
    }

    fn match_token(&mut self, token: Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> ParseResult<()> {
        if self.check(token.clone()) {
            self.advance();
            return Ok(());
        }
        match self.peek() {
            Some((found, span)) => Err(ParseError::unexpected_token(
                span.start,
                token.to_string(),
                found.to_string(),
            )),
            None => Err(ParseError::unexpected_eof(self.source_len)),
        }
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some((Token::Ident(s), _)) => {
                let val = s.to_string();
                self.advance();
                Ok(val)
            }
            Some((found, span)) => Err(ParseError::unexpected_token(
                span.start,
                "identifier",
                found.to_string(),
            )),
            None => Err(ParseError::unexpected_eof(self.source_len)),
        }
    }
}
