//! Sandboxed, side-effect-free expression evaluation for expression filters.
//!
//! Expressions run against a fixed whitelist of `CheckResult` fields
//! (`online`, `responseTime`, `statusCode`, `body` and `measurements.<name>`),
//! with hard budgets on input length, token count and nesting depth. There is
//! no ambient scripting access; the only string operation is
//! `field.includes("…")`. Callers treat any error here as a filter that did
//! not match.

use pulsegate_common::check::CheckResult;
use thiserror::Error;

pub const MAX_EXPRESSION_LEN: usize = 512;
const MAX_TOKENS: usize = 128;
const MAX_DEPTH: usize = 16;

#[derive(Debug, Error, PartialEq)]
pub enum ExpressionError {
    #[error("expression exceeds {MAX_EXPRESSION_LEN} characters")]
    TooLong,
    #[error("expression exceeds {MAX_TOKENS} tokens")]
    TooManyTokens,
    #[error("expression nests deeper than {MAX_DEPTH} levels")]
    TooDeep,
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("field '{0}' has no value")]
    MissingValue(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("expression did not evaluate to a boolean")]
    NotBoolean,
}

/// Evaluates `expr` against a read-only view of `result`. The final value
/// must be a boolean.
pub fn evaluate(expr: &str, result: &CheckResult) -> Result<bool, ExpressionError> {
    if expr.len() > MAX_EXPRESSION_LEN {
        return Err(ExpressionError::TooLong);
    }
    let tokens = tokenize(expr)?;
    let mut parser = Parser { tokens, pos: 0 };
    let ast = parser.parse_expr(0)?;
    parser.expect_end()?;
    match eval(&ast, result)? {
        Value::Bool(b) => Ok(b),
        _ => Err(ExpressionError::NotBoolean),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Bool(bool),
    Num(f64),
    Str(String),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    LParen,
    RParen,
    Dot,
    EqEq,
    NotEq,
    Ge,
    Le,
    Gt,
    Lt,
    AndAnd,
    OrOr,
    Bang,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '=' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::EqEq);
                } else {
                    return Err(ExpressionError::Parse("single '=' is not an operator".into()));
                }
            }
            '!' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::NotEq);
                } else {
                    tokens.push(Token::Bang);
                }
            }
            '>' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '<' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '&' => {
                chars.next();
                if chars.next_if_eq(&'&').is_some() {
                    tokens.push(Token::AndAnd);
                } else {
                    return Err(ExpressionError::Parse("single '&' is not an operator".into()));
                }
            }
            '|' => {
                chars.next();
                if chars.next_if_eq(&'|').is_some() {
                    tokens.push(Token::OrOr);
                } else {
                    return Err(ExpressionError::Parse("single '|' is not an operator".into()));
                }
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut literal = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    if c == '\\' {
                        match chars.next() {
                            Some(escaped) => literal.push(escaped),
                            None => break,
                        }
                    } else if c == quote {
                        closed = true;
                        break;
                    } else {
                        literal.push(c);
                    }
                }
                if !closed {
                    return Err(ExpressionError::Parse("unterminated string literal".into()));
                }
                tokens.push(Token::Str(literal));
            }
            c if c.is_ascii_digit() => {
                let mut literal = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        literal.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number: f64 = literal
                    .parse()
                    .map_err(|_| ExpressionError::Parse(format!("invalid number '{literal}'")))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(ExpressionError::Parse(format!("unexpected character '{other}'")));
            }
        }

        if tokens.len() > MAX_TOKENS {
            return Err(ExpressionError::TooManyTokens);
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum FieldRef {
    Online,
    ResponseTime,
    StatusCode,
    Body,
    Measurement(String),
}

impl FieldRef {
    fn name(&self) -> String {
        match self {
            FieldRef::Online => "online".to_string(),
            FieldRef::ResponseTime => "responseTime".to_string(),
            FieldRef::StatusCode => "statusCode".to_string(),
            FieldRef::Body => "body".to_string(),
            FieldRef::Measurement(name) => format!("measurements.{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum BinaryOp {
    Eq,
    NotEq,
    Gt,
    Lt,
    Ge,
    Le,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Field(FieldRef),
    /// `field.includes("needle")`
    Includes { field: FieldRef, needle: String },
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, context: &str) -> Result<(), ExpressionError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(ExpressionError::Parse(format!(
                "expected {context}, found {other:?}"
            ))),
        }
    }

    fn expect_end(&mut self) -> Result<(), ExpressionError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(ExpressionError::Parse(format!(
                "trailing input at {token:?}"
            ))),
        }
    }

    fn guard_depth(depth: usize) -> Result<(), ExpressionError> {
        if depth > MAX_DEPTH {
            Err(ExpressionError::TooDeep)
        } else {
            Ok(())
        }
    }

    fn parse_expr(&mut self, depth: usize) -> Result<Expr, ExpressionError> {
        Self::guard_depth(depth)?;
        let mut left = self.parse_and(depth + 1)?;
        while matches!(self.peek(), Some(Token::OrOr)) {
            self.next();
            let right = self.parse_and(depth + 1)?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self, depth: usize) -> Result<Expr, ExpressionError> {
        Self::guard_depth(depth)?;
        let mut left = self.parse_comparison(depth + 1)?;
        while matches!(self.peek(), Some(Token::AndAnd)) {
            self.next();
            let right = self.parse_comparison(depth + 1)?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self, depth: usize) -> Result<Expr, ExpressionError> {
        Self::guard_depth(depth)?;
        let left = self.parse_unary(depth + 1)?;
        let op = match self.peek() {
            Some(Token::EqEq) => BinaryOp::Eq,
            Some(Token::NotEq) => BinaryOp::NotEq,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Ge) => BinaryOp::Ge,
            Some(Token::Le) => BinaryOp::Le,
            _ => return Ok(left),
        };
        self.next();
        let right = self.parse_unary(depth + 1)?;
        Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_unary(&mut self, depth: usize) -> Result<Expr, ExpressionError> {
        Self::guard_depth(depth)?;
        if matches!(self.peek(), Some(Token::Bang)) {
            self.next();
            let inner = self.parse_unary(depth + 1)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_operand(depth + 1)
    }

    fn parse_operand(&mut self, depth: usize) -> Result<Expr, ExpressionError> {
        Self::guard_depth(depth)?;
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(Value::Num(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::LParen) => {
                let inner = self.parse_expr(depth + 1)?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::Ident(ident)) => match ident.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                _ => self.parse_field_or_call(ident),
            },
            other => Err(ExpressionError::Parse(format!(
                "expected an operand, found {other:?}"
            ))),
        }
    }

    fn parse_field_or_call(&mut self, ident: String) -> Result<Expr, ExpressionError> {
        let field = match ident.as_str() {
            "online" | "isOnline" => FieldRef::Online,
            "responseTime" => FieldRef::ResponseTime,
            "statusCode" => FieldRef::StatusCode,
            "body" => FieldRef::Body,
            "measurements" => {
                self.expect(Token::Dot, "'.' after 'measurements'")?;
                match self.next() {
                    Some(Token::Ident(name)) => FieldRef::Measurement(name),
                    other => {
                        return Err(ExpressionError::Parse(format!(
                            "expected a measurement name, found {other:?}"
                        )))
                    }
                }
            }
            _ => return Err(ExpressionError::UnknownField(ident)),
        };

        // Optional `.includes("…")` postfix.
        if matches!(self.peek(), Some(Token::Dot)) {
            self.next();
            match self.next() {
                Some(Token::Ident(method)) if method == "includes" => {
                    self.expect(Token::LParen, "'(' after 'includes'")?;
                    let needle = match self.next() {
                        Some(Token::Str(s)) => s,
                        other => {
                            return Err(ExpressionError::Parse(format!(
                                "includes() takes a string literal, found {other:?}"
                            )))
                        }
                    };
                    self.expect(Token::RParen, "')'")?;
                    Ok(Expr::Includes { field, needle })
                }
                other => Err(ExpressionError::Parse(format!(
                    "unknown method {other:?}; only includes() is available"
                ))),
            }
        } else {
            Ok(Expr::Field(field))
        }
    }
}

fn field_value(field: &FieldRef, result: &CheckResult) -> Result<Value, ExpressionError> {
    match field {
        FieldRef::Online => Ok(Value::Bool(result.is_online)),
        FieldRef::ResponseTime => result
            .response_time_ms
            .map(|ms| Value::Num(ms as f64))
            .ok_or_else(|| ExpressionError::MissingValue(field.name())),
        FieldRef::StatusCode => result
            .status_code
            .map(|code| Value::Num(code as f64))
            .ok_or_else(|| ExpressionError::MissingValue(field.name())),
        FieldRef::Body => Ok(Value::Str(
            result.body_excerpt.clone().unwrap_or_default(),
        )),
        FieldRef::Measurement(name) => result
            .measurements
            .get(name)
            .map(|v| Value::Num(*v))
            .ok_or_else(|| ExpressionError::MissingValue(field.name())),
    }
}

fn eval(expr: &Expr, result: &CheckResult) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Field(field) => field_value(field, result),
        Expr::Includes { field, needle } => match field_value(field, result)? {
            Value::Str(haystack) => Ok(Value::Bool(haystack.contains(needle.as_str()))),
            other => Err(ExpressionError::Type(format!(
                "includes() needs a string field, '{}' is a {}",
                field.name(),
                other.type_name()
            ))),
        },
        Expr::Not(inner) => match eval(inner, result)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(ExpressionError::Type(format!(
                "'!' needs a boolean, found {}",
                other.type_name()
            ))),
        },
        Expr::Binary { op, left, right } => {
            let left = eval(left, result)?;
            let right = eval(right, result)?;
            apply_binary(op, left, right)
        }
    }
}

fn apply_binary(op: &BinaryOp, left: Value, right: Value) -> Result<Value, ExpressionError> {
    match op {
        BinaryOp::And | BinaryOp::Or => match (left, right) {
            (Value::Bool(l), Value::Bool(r)) => Ok(Value::Bool(match op {
                BinaryOp::And => l && r,
                _ => l || r,
            })),
            (l, r) => Err(ExpressionError::Type(format!(
                "boolean operator needs booleans, found {} and {}",
                l.type_name(),
                r.type_name()
            ))),
        },
        BinaryOp::Eq | BinaryOp::NotEq => {
            let equal = match (&left, &right) {
                (Value::Bool(l), Value::Bool(r)) => l == r,
                (Value::Num(l), Value::Num(r)) => (l - r).abs() < f64::EPSILON,
                (Value::Str(l), Value::Str(r)) => l == r,
                _ => {
                    return Err(ExpressionError::Type(format!(
                        "cannot compare {} with {}",
                        left.type_name(),
                        right.type_name()
                    )))
                }
            };
            Ok(Value::Bool(match op {
                BinaryOp::Eq => equal,
                _ => !equal,
            }))
        }
        BinaryOp::Gt | BinaryOp::Lt | BinaryOp::Ge | BinaryOp::Le => match (&left, &right) {
            (Value::Num(l), Value::Num(r)) => Ok(Value::Bool(match op {
                BinaryOp::Gt => l > r,
                BinaryOp::Lt => l < r,
                BinaryOp::Ge => l >= r,
                _ => l <= r,
            })),
            _ => Err(ExpressionError::Type(format!(
                "ordering comparison needs numbers, found {} and {}",
                left.type_name(),
                right.type_name()
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn result_with_body(body: &str) -> CheckResult {
        CheckResult {
            monitor_id: 1,
            probe_id: "probe-1".to_string(),
            checked_at: Utc::now(),
            is_online: true,
            response_time_ms: Some(250),
            status_code: Some(200),
            body_excerpt: Some(body.to_string()),
            measurements: HashMap::from([("queueDepth".to_string(), 42.0)]),
            error: None,
        }
    }

    #[test]
    fn includes_matches_substring() {
        let result = result_with_body("internal error");
        assert_eq!(evaluate(r#"body.includes("error")"#, &result), Ok(true));

        let result = result_with_body("ok");
        assert_eq!(evaluate(r#"body.includes("error")"#, &result), Ok(false));
    }

    #[test]
    fn comparisons_and_boolean_operators_compose() {
        let result = result_with_body("service under maintenance");
        assert_eq!(
            evaluate(r#"statusCode == 200 && body.includes("maintenance")"#, &result),
            Ok(true)
        );
        assert_eq!(
            evaluate("responseTime > 2000 || !online", &result),
            Ok(false)
        );
        assert_eq!(
            evaluate("(responseTime > 100 && responseTime < 500)", &result),
            Ok(true)
        );
    }

    #[test]
    fn measurements_are_addressable_by_name() {
        let result = result_with_body("ok");
        assert_eq!(evaluate("measurements.queueDepth >= 40", &result), Ok(true));
        assert_eq!(
            evaluate("measurements.missing > 0", &result),
            Err(ExpressionError::MissingValue("measurements.missing".into()))
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = result_with_body("ok");
        assert_eq!(
            evaluate("secret > 0", &result),
            Err(ExpressionError::UnknownField("secret".into()))
        );
    }

    #[test]
    fn non_boolean_results_are_rejected() {
        let result = result_with_body("ok");
        assert_eq!(evaluate("responseTime", &result), Err(ExpressionError::NotBoolean));
    }

    #[test]
    fn mismatched_types_are_rejected() {
        let result = result_with_body("ok");
        assert!(matches!(
            evaluate(r#"responseTime == "fast""#, &result),
            Err(ExpressionError::Type(_))
        ));
    }

    #[test]
    fn oversized_input_is_rejected() {
        let result = result_with_body("ok");
        let long = format!("online && {}", "online && ".repeat(80));
        assert_eq!(evaluate(&long, &result), Err(ExpressionError::TooLong));
    }

    #[test]
    fn missing_latency_surfaces_as_missing_value() {
        let mut result = result_with_body("");
        result.response_time_ms = None;
        assert_eq!(
            evaluate("responseTime > 2000", &result),
            Err(ExpressionError::MissingValue("responseTime".into()))
        );
    }
}
