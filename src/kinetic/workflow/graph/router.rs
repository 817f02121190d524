// SPDX-License-Identifier: MIT

//! Edge routing
//!
//! Routing is a pure function of the graph and an executor's output. Fan-in
//! edges do not deliver directly; they hand the runner a part to buffer until
//! every source of the edge has contributed.

use serde_json::Value;

use super::definition::Graph;
use super::edge::Edge;

/// Result of routing one output along one edge
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// A message for the target's inbox in the next superstep
    Message { target: String, payload: Value },
    /// A contribution to the fan-in edge with the given index
    FanInPart {
        edge: usize,
        from: String,
        target: String,
        payload: Value,
    },
}

impl Delivery {
    pub fn target(&self) -> &str {
        match self {
            Delivery::Message { target, .. } | Delivery::FanInPart { target, .. } => target,
        }
    }
}

impl Graph {
    /// Compute where an executor's output goes
    ///
    /// Edges are visited in declaration order. Every matching conditional
    /// edge routes; no match leaves the output terminal.
    pub fn route(&self, from: &str, output: &Value) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        let mut conditional_edges = 0;
        let mut conditional_matches = 0;

        for (index, edge) in self.edges().iter().enumerate() {
            match edge {
                Edge::Direct { from: f, to } if f == from => {
                    deliveries.push(message(to, output));
                }
                Edge::Conditional {
                    from: f,
                    to,
                    condition,
                } if f == from => {
                    conditional_edges += 1;
                    if condition.evaluate(output) {
                        conditional_matches += 1;
                        deliveries.push(message(to, output));
                    }
                }
                Edge::FanOut { from: f, targets } if f == from => {
                    deliveries.extend(targets.iter().map(|t| message(t, output)));
                }
                Edge::FanIn { sources, to } if sources.iter().any(|s| s == from) => {
                    deliveries.push(Delivery::FanInPart {
                        edge: index,
                        from: from.to_string(),
                        target: to.clone(),
                        payload: output.clone(),
                    });
                }
                Edge::Switch {
                    from: f,
                    selector,
                    cases,
                    default,
                } if f == from => {
                    let case = selector.select(output);
                    let branch = case
                        .as_deref()
                        .and_then(|c| cases.iter().find(|(name, _)| name == c))
                        .map(|(_, target)| target)
                        .or(default.as_ref());
                    match branch {
                        Some(target) => deliveries.push(message(target, output)),
                        None => log::debug!(
                            "Switch from '{}' matched no case for {:?} and has no default",
                            from,
                            case
                        ),
                    }
                }
                _ => {}
            }
        }

        if conditional_edges > 0 && conditional_matches == 0 {
            log::debug!(
                "No conditional edge from '{}' matched; output is terminal",
                from
            );
        }

        deliveries
    }
}

fn message(target: &str, output: &Value) -> Delivery {
    Delivery::Message {
        target: target.to_string(),
        payload: output.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::tool::{FnTool, ToolResult};
    use crate::kinetic::workflow::executor::Executor;
    use crate::kinetic::workflow::graph::{Condition, GraphBuilder, Selector};
    use serde_json::json;

    fn node(id: &str) -> Executor {
        Executor::function(id, FnTool::new(id, |input: Value, _ctx| async move { ToolResult::Ok(input) }))
    }

    fn builder(ids: &[&str]) -> GraphBuilder {
        ids.iter()
            .fold(GraphBuilder::new(), |b, id| b.add_executor(node(id)))
            .set_start(ids[0])
    }

    fn targets(deliveries: &[Delivery]) -> Vec<&str> {
        deliveries.iter().map(Delivery::target).collect()
    }

    #[test]
    fn test_direct_edge() {
        let graph = builder(&["a", "b"]).add_edge("a", "b").build().unwrap();
        let routed = graph.route("a", &json!("x1"));
        assert_eq!(
            routed,
            vec![Delivery::Message {
                target: "b".into(),
                payload: json!("x1")
            }]
        );
        assert!(graph.route("b", &json!("done")).is_empty());
    }

    #[test]
    fn test_conditional_edge_without_match_is_terminal() {
        let graph = builder(&["a", "b"])
            .add_conditional_edge("a", "b", Condition::parse("output == 'go'").unwrap())
            .build()
            .unwrap();
        assert!(graph.route("a", &json!("stop")).is_empty());
        assert_eq!(targets(&graph.route("a", &json!("go"))), vec!["b"]);
    }

    #[test]
    fn test_all_matching_conditions_route() {
        let graph = builder(&["a", "b", "c"])
            .add_conditional_edge("a", "b", Condition::parse("score > 1").unwrap())
            .add_conditional_edge("a", "c", Condition::parse("score > 5").unwrap())
            .build()
            .unwrap();
        assert_eq!(targets(&graph.route("a", &json!({"score": 9}))), vec!["b", "c"]);
        assert_eq!(targets(&graph.route("a", &json!({"score": 3}))), vec!["b"]);
    }

    #[test]
    fn test_fan_out_copies_output() {
        let graph = builder(&["a", "b", "c"])
            .add_fan_out("a", ["b", "c"])
            .build()
            .unwrap();
        let routed = graph.route("a", &json!({"n": 1}));
        assert_eq!(targets(&routed), vec!["b", "c"]);
        assert!(routed.iter().all(|d| matches!(d, Delivery::Message { payload, .. } if payload == &json!({"n": 1}))));
    }

    #[test]
    fn test_fan_in_produces_parts() {
        let graph = builder(&["a", "b", "c", "d"])
            .add_fan_out("a", ["b", "c"])
            .add_fan_in(["b", "c"], "d")
            .build()
            .unwrap();
        assert_eq!(
            graph.route("c", &json!(2)),
            vec![Delivery::FanInPart {
                edge: 1,
                from: "c".into(),
                target: "d".into(),
                payload: json!(2)
            }]
        );
    }

    #[test]
    fn test_switch_picks_one_branch() {
        let graph = builder(&["triage", "fix", "plan", "archive"])
            .add_switch(
                "triage",
                Selector::path("kind"),
                [("bug", "fix"), ("idea", "plan")],
                Some("archive"),
            )
            .build()
            .unwrap();
        assert_eq!(targets(&graph.route("triage", &json!({"kind": "bug"}))), vec!["fix"]);
        assert_eq!(targets(&graph.route("triage", &json!({"kind": "rant"}))), vec!["archive"]);
        assert_eq!(targets(&graph.route("triage", &json!({}))), vec!["archive"]);
    }

    #[test]
    fn test_switch_without_default_drops_unmatched() {
        let graph = builder(&["triage", "fix"])
            .add_switch("triage", Selector::func(|v| v.as_str().map(str::to_string)), [("bug", "fix")], None)
            .build()
            .unwrap();
        assert!(graph.route("triage", &json!("feature")).is_empty());
        assert_eq!(targets(&graph.route("triage", &json!("bug"))), vec!["fix"]);
    }

    #[test]
    fn test_routing_is_deterministic() {
        let graph = builder(&["a", "b", "c"])
            .add_fan_out("a", ["c", "b"])
            .build()
            .unwrap();
        let output = json!({"k": [1, 2, 3]});
        assert_eq!(graph.route("a", &output), graph.route("a", &output));
    }
}
