//! Workflow normalization - rewrites pattern workflows as graphs
//!
//! `Sequential` chains its steps with direct edges. `Concurrent` sends the
//! input to every step at once and collects their results into one array
//! delivered to the aggregator.

use crate::adk::error::WorkflowError;
use crate::kinetic::workflow::types::{EdgeDefinition, ExecutorDefinition, WorkflowDefinition};

/// Id of the executor that distributes a Concurrent workflow's input
pub const DISPATCH_ID: &str = "concurrent_dispatch";
/// Id of the default aggregator of a Concurrent workflow
pub const AGGREGATE_ID: &str = "concurrent_aggregate";

/// Normalize any workflow definition to graph form
pub fn normalize_to_graph(def: &WorkflowDefinition) -> Result<WorkflowDefinition, WorkflowError> {
    match def.kind.as_str() {
        "Graph" => Ok(def.clone()),
        "Sequential" => normalize_sequential(def),
        "Concurrent" => normalize_concurrent(def),
        other => Err(WorkflowError::UnknownKind(other.to_string())),
    }
}

fn normalize_sequential(def: &WorkflowDefinition) -> Result<WorkflowDefinition, WorkflowError> {
    let first = def
        .steps
        .first()
        .ok_or_else(|| WorkflowError::EmptyPattern(def.kind.clone()))?;

    let edges = def
        .steps
        .windows(2)
        .map(|pair| EdgeDefinition::direct(&pair[0].id, &pair[1].id))
        .collect();

    Ok(WorkflowDefinition {
        kind: "Graph".to_string(),
        start: Some(first.id.clone()),
        executors: def.steps.clone(),
        edges,
        steps: Vec::new(),
        ..def.clone()
    })
}

fn normalize_concurrent(def: &WorkflowDefinition) -> Result<WorkflowDefinition, WorkflowError> {
    if def.steps.is_empty() {
        return Err(WorkflowError::EmptyPattern(def.kind.clone()));
    }

    let aggregator = def
        .aggregator
        .clone()
        .unwrap_or_else(|| ExecutorDefinition::passthrough(AGGREGATE_ID));
    let step_ids: Vec<String> = def.steps.iter().map(|s| s.id.clone()).collect();

    let mut executors = vec![ExecutorDefinition::passthrough(DISPATCH_ID)];
    executors.extend(def.steps.iter().cloned());
    executors.push(aggregator.clone());

    // A fan-in needs at least two sources
    let edges = if step_ids.len() == 1 {
        vec![
            EdgeDefinition::direct(DISPATCH_ID, &step_ids[0]),
            EdgeDefinition::direct(&step_ids[0], &aggregator.id),
        ]
    } else {
        vec![
            EdgeDefinition::fan_out(DISPATCH_ID, step_ids.clone()),
            EdgeDefinition::fan_in(step_ids, &aggregator.id),
        ]
    };

    Ok(WorkflowDefinition {
        kind: "Graph".to_string(),
        start: Some(DISPATCH_ID.to_string()),
        executors,
        edges,
        steps: Vec::new(),
        aggregator: None,
        outputs: Some(vec![aggregator.id]),
        ..def.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinetic::workflow::loader::WorkflowLoader;
    use crate::kinetic::workflow::types::Endpoints;

    fn step(id: &str) -> String {
        format!("  - {{ id: {}, kind: function, tool: echo }}\n", id)
    }

    fn pattern(kind: &str, ids: &[&str]) -> WorkflowDefinition {
        let mut yaml = format!("name: P\nkind: {}\nsteps:\n", kind);
        for id in ids {
            yaml.push_str(&step(id));
        }
        WorkflowLoader::parse_yaml(&yaml).unwrap()
    }

    #[test]
    fn test_graph_passes_through() {
        let def = WorkflowLoader::parse_yaml(
            "name: G\nstart: a\nexecutors:\n  - { id: a, kind: passthrough }\n",
        )
        .unwrap();
        let normalized = normalize_to_graph(&def).unwrap();
        assert_eq!(normalized.start.as_deref(), Some("a"));
        assert_eq!(normalized.executors, def.executors);
    }

    #[test]
    fn test_normalize_sequential() {
        let normalized = normalize_to_graph(&pattern("Sequential", &["a", "b", "c"])).unwrap();

        assert_eq!(normalized.kind, "Graph");
        assert_eq!(normalized.start.as_deref(), Some("a"));
        assert_eq!(normalized.executors.len(), 3);
        assert_eq!(
            normalized.edges,
            vec![EdgeDefinition::direct("a", "b"), EdgeDefinition::direct("b", "c")]
        );
        assert!(normalized.steps.is_empty());
    }

    #[test]
    fn test_normalize_concurrent() {
        let normalized = normalize_to_graph(&pattern("Concurrent", &["a", "b"])).unwrap();

        assert_eq!(normalized.start.as_deref(), Some(DISPATCH_ID));
        let ids: Vec<&str> = normalized.executors.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![DISPATCH_ID, "a", "b", AGGREGATE_ID]);
        assert_eq!(
            normalized.edges[1].from,
            Endpoints::Many(vec!["a".into(), "b".into()])
        );
        assert_eq!(normalized.outputs, Some(vec![AGGREGATE_ID.to_string()]));
    }

    #[test]
    fn test_concurrent_single_step_uses_direct_edges() {
        let normalized = normalize_to_graph(&pattern("Concurrent", &["only"])).unwrap();
        assert_eq!(
            normalized.edges,
            vec![
                EdgeDefinition::direct(DISPATCH_ID, "only"),
                EdgeDefinition::direct("only", AGGREGATE_ID)
            ]
        );
    }

    #[test]
    fn test_empty_and_unknown_patterns() {
        let empty = WorkflowLoader::parse_yaml("name: E\nkind: Sequential\n").unwrap();
        assert!(matches!(
            normalize_to_graph(&empty),
            Err(WorkflowError::EmptyPattern(_))
        ));

        let unknown = WorkflowLoader::parse_yaml("name: U\nkind: Loop\n").unwrap();
        assert!(matches!(
            normalize_to_graph(&unknown),
            Err(WorkflowError::UnknownKind(kind)) if kind == "Loop"
        ));
    }
}
