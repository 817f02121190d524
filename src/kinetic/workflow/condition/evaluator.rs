//! Condition expression evaluator
//!
//! Paths resolve against the output being routed: `output` is the whole
//! payload, `output.a.b` and `a.b` both address a nested field.

use super::ast::{CompareOp, Comparison, Expression, Literal};
use serde_json::Value;

/// Evaluate a condition expression against an executor output
pub fn evaluate(expr: &Expression, output: &Value) -> bool {
    match expr {
        Expression::Const(value) => *value,
        Expression::Compare(comparison) => holds(comparison, output),
        Expression::Truthy(path) => is_truthy(resolve_path(output, path)),
        Expression::And(left, right) => evaluate(left, output) && evaluate(right, output),
        Expression::Or(left, right) => evaluate(left, output) || evaluate(right, output),
        Expression::Not(inner) => !evaluate(inner, output),
    }
}

/// Resolve a dotted path inside an output payload
pub fn resolve_path<'a>(output: &'a Value, path: &str) -> Option<&'a Value> {
    let rest = match path {
        "output" => return Some(output),
        p => p.strip_prefix("output.").unwrap_or(p),
    };

    rest.split('.').try_fold(output, |current, part| match current {
        Value::Array(items) => items.get(part.parse::<usize>().ok()?),
        other => other.get(part),
    })
}

fn holds(comparison: &Comparison, output: &Value) -> bool {
    let value = resolve_path(output, &comparison.path);
    let literal = &comparison.literal;

    let result = match comparison.op {
        CompareOp::Eq => literal.matches(value),
        CompareOp::NotEq => !literal.matches(value),
        CompareOp::Contains => contains(value, literal),
        op => {
            let (Some(actual), Some(bound)) = (value.and_then(Value::as_f64), literal.as_number())
            else {
                return false;
            };
            match op {
                CompareOp::Gt => actual > bound,
                CompareOp::Gte => actual >= bound,
                CompareOp::Lt => actual < bound,
                _ => actual <= bound,
            }
        }
    };
    log::trace!(
        "{} {} {} -> {}",
        comparison.path,
        comparison.op,
        literal,
        result
    );
    result
}

fn contains(value: Option<&Value>, literal: &Literal) -> bool {
    match (value, literal) {
        (Some(Value::String(text)), Literal::String(needle)) => text.contains(needle.as_str()),
        (Some(Value::Array(items)), _) => items.iter().any(|item| literal.matches(Some(item))),
        _ => false,
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}
