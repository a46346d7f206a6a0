//! # Flowdeck Parser
//!
//! Tokenizer and parser for response-check formulas.
//!
//! A response check is a small boolean expression written by the author of a
//! step, e.g. `Q1 == 4 && len(Q2.answer) > 0`. Source text is never executed;
//! it is parsed into an [`ast::Expression`] and interpreted by the evaluator
//! against a map of learner responses.

pub mod ast;
pub mod error;
pub mod parser;
pub mod tokenizer;

pub use ast::{BinaryOp, Expression, Span, UnaryOp};
pub use error::{ParseError, ParseResult};
pub use parser::{parse, Parser};
pub use tokenizer::{tokenize, Token};
