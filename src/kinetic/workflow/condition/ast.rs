// SPDX-License-Identifier: MIT

//! Parsed form of an edge condition

use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `path op literal`
    Compare(Comparison),
    /// A bare path, holds when the resolved value is truthy
    Truthy(String),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    /// `true` or `false` written directly
    Const(bool),
}

impl Expression {
    pub fn compare(path: impl Into<String>, op: CompareOp, literal: Literal) -> Self {
        Expression::Compare(Comparison {
            path: path.into(),
            op,
            literal,
        })
    }
}

/// A path in the routed output checked against a literal
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub path: String,
    pub op: CompareOp,
    pub literal: Literal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Substring of a string, or element of an array
    Contains,
}

const OPERATORS: [(&str, CompareOp); 7] = [
    ("==", CompareOp::Eq),
    ("!=", CompareOp::NotEq),
    (">=", CompareOp::Gte),
    ("<=", CompareOp::Lte),
    (">", CompareOp::Gt),
    ("<", CompareOp::Lt),
    ("contains", CompareOp::Contains),
];

impl CompareOp {
    /// Operator spelled exactly as `symbol`
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        OPERATORS
            .iter()
            .find(|(text, _)| *text == symbol)
            .map(|(_, op)| *op)
    }

    pub fn symbol(self) -> &'static str {
        OPERATORS
            .iter()
            .find(|(_, op)| *op == self)
            .map(|(text, _)| *text)
            .unwrap_or("?")
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
}

impl Literal {
    /// Keyword literals: `true`, `false` and `null`
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "true" => Some(Literal::Boolean(true)),
            "false" => Some(Literal::Boolean(false)),
            "null" => Some(Literal::Null),
            _ => None,
        }
    }

    /// Equality against a resolved value. A missing value equals `null`.
    pub fn matches(&self, value: Option<&Value>) -> bool {
        match (self, value.unwrap_or(&Value::Null)) {
            (Literal::Null, Value::Null) => true,
            (Literal::String(expected), Value::String(actual)) => expected == actual,
            (Literal::Boolean(expected), Value::Bool(actual)) => expected == actual,
            (Literal::Number(expected), Value::Number(actual)) => actual
                .as_f64()
                .is_some_and(|n| (n - expected).abs() < f64::EPSILON),
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Literal::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "'{}'", s),
            Literal::Number(n) => write!(f, "{}", n),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Null => f.write_str("null"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_symbols() {
        for (text, op) in OPERATORS {
            assert_eq!(CompareOp::from_symbol(text), Some(op));
            assert_eq!(op.to_string(), text);
        }
        assert_eq!(CompareOp::from_symbol("="), None);
    }

    #[test]
    fn test_literal_matches() {
        assert!(Literal::Null.matches(None));
        assert!(Literal::Null.matches(Some(&json!(null))));
        assert!(Literal::Number(2.0).matches(Some(&json!(2))));
        assert!(!Literal::String("2".into()).matches(Some(&json!(2))));
        assert!(!Literal::Boolean(false).matches(None));
    }

    #[test]
    fn test_literal_display() {
        assert_eq!(Literal::String("go".into()).to_string(), "'go'");
        assert_eq!(Literal::Number(0.5).to_string(), "0.5");
        assert_eq!(Literal::from_keyword("null").unwrap().to_string(), "null");
    }
}
