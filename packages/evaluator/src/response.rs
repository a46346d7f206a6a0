//! # Response Checks
//!
//! A step's response check is a small boolean formula over the learner's
//! answers, keyed by block name:
//!
//! ```text
//! Q1.value >= 10 && lower(Q2) == 'mitochondria'
//! ```
//!
//! Checks are parsed by `flowdeck-parser` and interpreted here over a
//! read-only variable map. There is no assignment and no way to reach
//! anything outside the supplied responses; the only callable functions are
//! the pure ones in [`FUNCTIONS`].
//!
//! Any evaluation error (a missing variable, a type mismatch, a parse
//! failure) grades the response as incorrect. Errors never escape as system
//! failures.

use flowdeck_parser::{parse, BinaryOp, Expression, ParseError, Span, UnaryOp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

pub type EvalResult<T> = Result<T, EvalError>;

/// Learner responses keyed by block name
pub type ResponseRecord = BTreeMap<String, serde_json::Value>;

/// Functions a check may call
pub const FUNCTIONS: [&str; 8] = ["abs", "min", "max", "round", "floor", "ceil", "len", "lower"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Variable '{name}' not found at {span:?}")]
    UndefinedVariable { name: String, span: Span },

    #[error("Property '{property}' not found at {span:?}")]
    MissingProperty { property: String, span: Span },

    #[error("Division by zero at {span:?}")]
    DivisionByZero { span: Span },

    #[error("Invalid operands for operator {operator} at {span:?}: {details}")]
    InvalidOperands {
        operator: String,
        details: String,
        span: Span,
    },

    #[error("Unknown function '{name}' at {span:?}")]
    UnknownFunction { name: String, span: Span },

    #[error("Invalid arguments to {function} at {span:?}: {details}")]
    InvalidArguments {
        function: String,
        details: String,
        span: Span,
    },

    #[error("Type error at {span:?}: {message}")]
    TypeError { message: String, span: Span },
}

/// Runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(f64),
    Boolean(bool),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Null,
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    /// Numeric view; numeric strings count, since typed answers arrive as text
    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Null => "null",
        }
    }

    /// Equality used by `==` and `===`
    fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
                match (self.as_number(), other.as_number()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Null => Ok(()),
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(Value::to_string).collect();
                write!(f, "{}", parts.join(","))
            }
            Value::Object(_) => write!(f, "[object]"),
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::Array(items.iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Object(map.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect())
            }
        }
    }
}

/// Result of grading one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum CheckOutcome {
    Correct,
    Incorrect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl CheckOutcome {
    pub fn is_correct(&self) -> bool {
        matches!(self, CheckOutcome::Correct)
    }
}

/// A compiled response check
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseCheck {
    source: String,
    expr: Option<Expression>,
}

impl ResponseCheck {
    /// Parse a check; blank source accepts every response
    pub fn compile(source: &str) -> Result<Self, ParseError> {
        let expr = if source.trim().is_empty() {
            None
        } else {
            Some(parse(source)?)
        };

        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Variables (block names) the check reads
    pub fn variables(&self) -> Vec<String> {
        self.expr
            .as_ref()
            .map(|e| e.variables().into_iter().collect())
            .unwrap_or_default()
    }

    pub fn evaluate(&self, responses: &ResponseRecord) -> EvalResult<Value> {
        match &self.expr {
            Some(expr) => Interpreter::new(responses).run(expr),
            None => Ok(Value::Boolean(true)),
        }
    }

    pub fn check(&self, responses: &ResponseRecord) -> CheckOutcome {
        match self.evaluate(responses) {
            Ok(value) if value.is_truthy() => CheckOutcome::Correct,
            Ok(_) => CheckOutcome::Incorrect { reason: None },
            Err(e) => {
                debug!(error = %e, check = %self.source, "Response check failed to evaluate");
                CheckOutcome::Incorrect {
                    reason: Some(e.to_string()),
                }
            }
        }
    }
}

/// Grade responses against a stored check; parse failures grade as incorrect
pub fn grade(source: Option<&str>, responses: &ResponseRecord) -> CheckOutcome {
    match ResponseCheck::compile(source.unwrap_or_default()) {
        Ok(check) => check.check(responses),
        Err(e) => {
            debug!(error = %e, "Response check failed to parse");
            CheckOutcome::Incorrect {
                reason: Some(e.to_string()),
            }
        }
    }
}

/// Tree-walking evaluator over a response record
pub struct Interpreter<'a> {
    responses: &'a ResponseRecord,
}

impl<'a> Interpreter<'a> {
    pub fn new(responses: &'a ResponseRecord) -> Self {
        Self { responses }
    }

    /// Evaluate after checking every referenced variable is present
    pub fn run(&self, expr: &Expression) -> EvalResult<Value> {
        if let Some(missing) = expr.variables().into_iter().find(|name| !self.responses.contains_key(name)) {
            return Err(EvalError::UndefinedVariable {
                name: missing,
                span: expr.span(),
            });
        }
        self.evaluate(expr)
    }

    pub fn evaluate(&self, expr: &Expression) -> EvalResult<Value> {
        match expr {
            Expression::Literal { value, .. } => Ok(Value::String(value.clone())),

            Expression::Number { value, .. } => Ok(Value::Number(*value)),

            Expression::Boolean { value, .. } => Ok(Value::Boolean(*value)),

            Expression::Null { .. } => Ok(Value::Null),

            Expression::Variable { name, span } => {
                self.responses
                    .get(name)
                    .map(Value::from)
                    .ok_or_else(|| EvalError::UndefinedVariable {
                        name: name.clone(),
                        span: *span,
                    })
            }

            Expression::Member {
                object,
                property,
                span,
            } => match self.evaluate(object)? {
                Value::Object(mut map) => map.remove(property).ok_or_else(|| EvalError::MissingProperty {
                    property: property.clone(),
                    span: *span,
                }),
                other => Err(EvalError::TypeError {
                    message: format!("Cannot access property {} on {}", property, other.type_name()),
                    span: *span,
                }),
            },

            Expression::Unary { operator, operand, span } => {
                let value = self.evaluate(operand)?;
                match operator {
                    UnaryOp::Not => Ok(Value::Boolean(!value.is_truthy())),
                    UnaryOp::Negate => value.as_number().map(|n| Value::Number(-n)).ok_or_else(|| {
                        EvalError::InvalidOperands {
                            operator: "-".to_string(),
                            details: format!("Expected number, got {}", value.type_name()),
                            span: *span,
                        }
                    }),
                }
            }

            Expression::Binary {
                left,
                operator,
                right,
                span,
            } => match operator {
                BinaryOp::And => {
                    let left_val = self.evaluate(left)?;
                    if !left_val.is_truthy() {
                        return Ok(Value::Boolean(false));
                    }
                    Ok(Value::Boolean(self.evaluate(right)?.is_truthy()))
                }
                BinaryOp::Or => {
                    let left_val = self.evaluate(left)?;
                    if left_val.is_truthy() {
                        return Ok(Value::Boolean(true));
                    }
                    Ok(Value::Boolean(self.evaluate(right)?.is_truthy()))
                }
                _ => {
                    let left_val = self.evaluate(left)?;
                    let right_val = self.evaluate(right)?;
                    binary(*operator, &left_val, &right_val, *span)
                }
            },

            Expression::Call {
                function,
                arguments,
                span,
            } => {
                let args = arguments
                    .iter()
                    .map(|arg| self.evaluate(arg))
                    .collect::<EvalResult<Vec<_>>>()?;
                call(function, &args, *span)
            }
        }
    }
}

fn operator_symbol(operator: BinaryOp) -> &'static str {
    match operator {
        BinaryOp::Add => "+",
        BinaryOp::Subtract => "-",
        BinaryOp::Multiply => "*",
        BinaryOp::Divide => "/",
        BinaryOp::Modulo => "%",
        BinaryOp::Equals => "==",
        BinaryOp::NotEquals => "!=",
        BinaryOp::LessThan => "<",
        BinaryOp::LessThanOrEqual => "<=",
        BinaryOp::GreaterThan => ">",
        BinaryOp::GreaterThanOrEqual => ">=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
    }
}

fn binary(operator: BinaryOp, left: &Value, right: &Value, span: Span) -> EvalResult<Value> {
    let invalid = || EvalError::InvalidOperands {
        operator: operator_symbol(operator).to_string(),
        details: format!("got {} and {}", left.type_name(), right.type_name()),
        span,
    };

    match operator {
        BinaryOp::Equals => Ok(Value::Boolean(left.loosely_equals(right))),
        BinaryOp::NotEquals => Ok(Value::Boolean(!left.loosely_equals(right))),

        BinaryOp::Add => match (left, right) {
            (Value::String(_), _) | (_, Value::String(_)) => Ok(Value::String(format!("{left}{right}"))),
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            _ => Err(invalid()),
        },

        BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
            let (Some(a), Some(b)) = (left.as_number(), right.as_number()) else {
                return Err(invalid());
            };
            match operator {
                BinaryOp::Subtract => Ok(Value::Number(a - b)),
                BinaryOp::Multiply => Ok(Value::Number(a * b)),
                _ if b == 0.0 => Err(EvalError::DivisionByZero { span }),
                BinaryOp::Divide => Ok(Value::Number(a / b)),
                _ => Ok(Value::Number(a % b)),
            }
        }

        BinaryOp::LessThan | BinaryOp::LessThanOrEqual | BinaryOp::GreaterThan | BinaryOp::GreaterThanOrEqual => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => a.partial_cmp(b),
                _ => match (left.as_number(), right.as_number()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => return Err(invalid()),
                },
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Boolean(false));
            };
            Ok(Value::Boolean(match operator {
                BinaryOp::LessThan => ordering.is_lt(),
                BinaryOp::LessThanOrEqual => ordering.is_le(),
                BinaryOp::GreaterThan => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }

        BinaryOp::And | BinaryOp::Or => Err(invalid()),
    }
}

fn call(function: &str, args: &[Value], span: Span) -> EvalResult<Value> {
    let invalid = |details: &str| EvalError::InvalidArguments {
        function: function.to_string(),
        details: details.to_string(),
        span,
    };

    let single_number = || match args {
        [value] => value.as_number().ok_or_else(|| invalid("expected a number")),
        _ => Err(invalid("expected exactly one argument")),
    };

    match function {
        "abs" => Ok(Value::Number(single_number()?.abs())),
        "round" => Ok(Value::Number(single_number()?.round())),
        "floor" => Ok(Value::Number(single_number()?.floor())),
        "ceil" => Ok(Value::Number(single_number()?.ceil())),

        "min" | "max" => {
            let numbers = args
                .iter()
                .map(|v| v.as_number().ok_or_else(|| invalid("expected numbers")))
                .collect::<EvalResult<Vec<f64>>>()?;
            let folded = if function == "min" {
                numbers.into_iter().reduce(f64::min)
            } else {
                numbers.into_iter().reduce(f64::max)
            };
            folded.map(Value::Number).ok_or_else(|| invalid("expected at least one argument"))
        }

        "len" => match args {
            [Value::String(s)] => Ok(Value::Number(s.chars().count() as f64)),
            [Value::Array(items)] => Ok(Value::Number(items.len() as f64)),
            [Value::Object(map)] => Ok(Value::Number(map.len() as f64)),
            [Value::Null] => Ok(Value::Number(0.0)),
            _ => Err(invalid("expected one string, array or object")),
        },

        "lower" => match args {
            [value] => Ok(Value::String(value.to_string().to_lowercase())),
            _ => Err(invalid("expected exactly one argument")),
        },

        _ => Err(EvalError::UnknownFunction {
            name: function.to_string(),
            span,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn responses(value: serde_json::Value) -> ResponseRecord {
        serde_json::from_value(value).unwrap()
    }

    fn eval(source: &str, vars: serde_json::Value) -> EvalResult<Value> {
        ResponseCheck::compile(source).unwrap().evaluate(&responses(vars))
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(eval("1 + 2 * 3", json!({})), Ok(Value::Number(7.0)));
        assert_eq!(eval("(1 + 2) * 3", json!({})), Ok(Value::Number(9.0)));
        assert_eq!(eval("7 % 4 - -1", json!({})), Ok(Value::Number(4.0)));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(eval("'a' + 1", json!({})), Ok(Value::String("a1".into())));
        assert_eq!(eval("Q1 + '!'", json!({ "Q1": "hi" })), Ok(Value::String("hi!".into())));
    }

    #[test]
    fn test_numeric_strings_compare_as_numbers() {
        assert_eq!(eval("Q1 == 4", json!({ "Q1": "4" })), Ok(Value::Boolean(true)));
        assert_eq!(eval("Q1 === 4", json!({ "Q1": " 4 " })), Ok(Value::Boolean(true)));
        assert_eq!(eval("Q1 > 3", json!({ "Q1": "10" })), Ok(Value::Boolean(true)));
        assert_eq!(eval("Q1 != 'x'", json!({ "Q1": 1 })), Ok(Value::Boolean(true)));
    }

    #[test]
    fn test_member_access() {
        let vars = json!({ "Q1": { "value": 12, "selected": ["a", "b"] } });
        assert_eq!(eval("Q1.value >= 10", vars.clone()), Ok(Value::Boolean(true)));
        assert_eq!(eval("len(Q1.selected)", vars.clone()), Ok(Value::Number(2.0)));
        assert!(matches!(
            eval("Q1.missing", vars),
            Err(EvalError::MissingProperty { .. })
        ));
    }

    #[test]
    fn test_missing_variable_rejects_even_when_short_circuited() {
        let result = eval("true || Q9 == 1", json!({}));
        assert!(matches!(result, Err(EvalError::UndefinedVariable { ref name, .. }) if name == "Q9"));
    }

    #[test]
    fn test_short_circuit_skips_right_side_errors() {
        assert_eq!(eval("false && 1 / 0", json!({})), Ok(Value::Boolean(false)));
        assert_eq!(eval("true || 1 / 0", json!({})), Ok(Value::Boolean(true)));
        assert!(matches!(
            eval("true && 1 / 0", json!({})),
            Err(EvalError::DivisionByZero { .. })
        ));
    }

    #[test]
    fn test_functions() {
        assert_eq!(eval("abs(-3)", json!({})), Ok(Value::Number(3.0)));
        assert_eq!(eval("min(4, 2, 8)", json!({})), Ok(Value::Number(2.0)));
        assert_eq!(eval("max(4, 2, 8)", json!({})), Ok(Value::Number(8.0)));
        assert_eq!(eval("round(2.5) + floor(1.9) + ceil(0.1)", json!({})), Ok(Value::Number(5.0)));
        assert_eq!(eval("lower('HeLLo')", json!({})), Ok(Value::String("hello".into())));
        assert!(matches!(
            eval("exec('rm')", json!({})),
            Err(EvalError::UnknownFunction { .. })
        ));
        assert!(matches!(
            eval("abs()", json!({})),
            Err(EvalError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_type_errors() {
        assert!(matches!(
            eval("true - 1", json!({})),
            Err(EvalError::InvalidOperands { .. })
        ));
        assert!(matches!(
            eval("Q1.value", json!({ "Q1": 3 })),
            Err(EvalError::TypeError { .. })
        ));
    }

    #[test]
    fn test_check_outcomes() {
        let check = ResponseCheck::compile("Q1 == 'b'").unwrap();
        assert_eq!(check.variables(), vec!["Q1".to_string()]);
        assert!(check.check(&responses(json!({ "Q1": "b" }))).is_correct());
        assert_eq!(
            check.check(&responses(json!({ "Q1": "c" }))),
            CheckOutcome::Incorrect { reason: None }
        );
        assert!(matches!(
            check.check(&responses(json!({}))),
            CheckOutcome::Incorrect { reason: Some(_) }
        ));
    }

    #[test]
    fn test_blank_check_accepts_anything() {
        assert!(grade(None, &ResponseRecord::new()).is_correct());
        assert!(grade(Some("  "), &ResponseRecord::new()).is_correct());
    }

    #[test]
    fn test_unparsable_check_is_incorrect() {
        assert!(!grade(Some("Q1 =="), &responses(json!({ "Q1": 1 }))).is_correct());
    }

    #[test]
    fn test_nesting_limit_grades_incorrect() {
        let nested = format!("{}Q1{}", "(".repeat(3_000), ")".repeat(3_000));
        assert!(matches!(
            grade(Some(&nested), &responses(json!({ "Q1": true }))),
            CheckOutcome::Incorrect { reason: Some(_) }
        ));

        let shallow = format!("{}Q1{}", "(".repeat(16), ")".repeat(16));
        assert!(grade(Some(&shallow), &responses(json!({ "Q1": true }))).is_correct());
    }
}
