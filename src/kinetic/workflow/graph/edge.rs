// SPDX-License-Identifier: MIT

//! Edge definitions and routing predicates

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::adk::error::WorkflowError;
use crate::kinetic::workflow::condition::{self, Expression};
use crate::kinetic::workflow::executor::value_to_text;

type PredicateFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
type SelectorFn = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// A connection between executors
#[derive(Debug, Clone)]
pub enum Edge {
    /// Always delivers the output to `to`
    Direct { from: String, to: String },
    /// Delivers the output to `to` when the condition holds
    Conditional {
        from: String,
        to: String,
        condition: Condition,
    },
    /// Delivers a copy of the output to every target
    FanOut { from: String, targets: Vec<String> },
    /// Collects one output from every source before delivering to `to`
    FanIn { sources: Vec<String>, to: String },
    /// Picks one branch by the case the selector returns
    Switch {
        from: String,
        selector: Selector,
        cases: Vec<(String, String)>,
        default: Option<String>,
    },
}

impl Edge {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Edge::Direct { .. } => "direct",
            Edge::Conditional { .. } => "conditional",
            Edge::FanOut { .. } => "fan_out",
            Edge::FanIn { .. } => "fan_in",
            Edge::Switch { .. } => "switch",
        }
    }

    /// Executors whose output travels along this edge
    pub fn origins(&self) -> Vec<&str> {
        match self {
            Edge::Direct { from, .. }
            | Edge::Conditional { from, .. }
            | Edge::FanOut { from, .. }
            | Edge::Switch { from, .. } => vec![from.as_str()],
            Edge::FanIn { sources, .. } => sources.iter().map(String::as_str).collect(),
        }
    }

    /// Executors this edge can deliver to
    pub fn destinations(&self) -> Vec<&str> {
        match self {
            Edge::Direct { to, .. } | Edge::Conditional { to, .. } | Edge::FanIn { to, .. } => {
                vec![to.as_str()]
            }
            Edge::FanOut { targets, .. } => targets.iter().map(String::as_str).collect(),
            Edge::Switch { cases, default, .. } => cases
                .iter()
                .map(|(_, target)| target.as_str())
                .chain(default.as_deref())
                .collect(),
        }
    }
}

/// Predicate guarding a conditional edge
#[derive(Clone)]
pub enum Condition {
    /// Parsed condition expression, kept with its source text
    Expr { text: String, expr: Expression },
    /// Caller-supplied predicate
    Predicate(PredicateFn),
}

impl Condition {
    pub fn parse(text: &str) -> Result<Self, WorkflowError> {
        Ok(Condition::Expr {
            text: text.to_string(),
            expr: condition::parse(text)?,
        })
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Condition::Predicate(Arc::new(f))
    }

    pub fn evaluate(&self, output: &Value) -> bool {
        match self {
            Condition::Expr { expr, .. } => condition::evaluate(expr, output),
            Condition::Predicate(f) => f(output),
        }
    }

    pub(crate) fn describe(&self) -> &str {
        match self {
            Condition::Expr { text, .. } => text,
            Condition::Predicate(_) => "<predicate>",
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Condition({})", self.describe())
    }
}

/// Discriminator of a switch-case edge
#[derive(Clone)]
pub enum Selector {
    /// Text of the value at a path in the output
    Path(String),
    /// Caller-supplied discriminator
    Func(SelectorFn),
}

impl Selector {
    pub fn path(path: impl Into<String>) -> Self {
        Selector::Path(path.into())
    }

    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        Selector::Func(Arc::new(f))
    }

    pub fn select(&self, output: &Value) -> Option<String> {
        match self {
            Selector::Path(path) => condition::resolve_path(output, path).map(value_to_text),
            Selector::Func(f) => f(output),
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Selector::Path(path) => format!("path:{}", path),
            Selector::Func(_) => "<selector>".to_string(),
        }
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({})", self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_condition_from_text() {
        let cond = Condition::parse("output == 'go'").unwrap();
        assert!(cond.evaluate(&json!("go")));
        assert!(!cond.evaluate(&json!("stop")));
        assert_eq!(format!("{:?}", cond), "Condition(output == 'go')");
    }

    #[test]
    fn test_condition_parse_error() {
        assert!(matches!(
            Condition::parse("output ="),
            Err(WorkflowError::InvalidCondition { .. })
        ));
    }

    #[test]
    fn test_predicate_condition() {
        let cond = Condition::predicate(|v| v.as_i64().is_some_and(|n| n > 10));
        assert!(cond.evaluate(&json!(11)));
        assert!(!cond.evaluate(&json!(3)));
    }

    #[test]
    fn test_path_selector() {
        let selector = Selector::path("category");
        assert_eq!(
            selector.select(&json!({"category": "billing"})),
            Some("billing".to_string())
        );
        assert_eq!(selector.select(&json!({})), None);
        assert_eq!(Selector::path("output").select(&json!(3)), Some("3".to_string()));
    }

    #[test]
    fn test_edge_endpoints() {
        let edge = Edge::Switch {
            from: "triage".into(),
            selector: Selector::path("output"),
            cases: vec![("bug".into(), "fix".into()), ("idea".into(), "plan".into())],
            default: Some("archive".into()),
        };
        assert_eq!(edge.origins(), vec!["triage"]);
        assert_eq!(edge.destinations(), vec!["fix", "plan", "archive"]);
        assert_eq!(edge.kind_name(), "switch");

        let fan_in = Edge::FanIn {
            sources: vec!["a".into(), "b".into()],
            to: "join".into(),
        };
        assert_eq!(fan_in.origins(), vec!["a", "b"]);
        assert_eq!(fan_in.destinations(), vec!["join"]);
    }
}
