// SPDX-License-Identifier: MIT

//! Immutable workflow graph and its validating builder

use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::edge::{Condition, Edge, Selector};
use crate::adk::error::GraphValidationError;
use crate::kinetic::workflow::executor::Executor;
use crate::kinetic::workflow::state::StateSchema;

/// Validated executor graph
///
/// A graph never changes after `GraphBuilder::build`; runs share it behind
/// an `Arc` and keep their own mutable state.
#[derive(Debug)]
pub struct Graph {
    executors: HashMap<String, Arc<Executor>>,
    order: Vec<String>,
    edges: Vec<Edge>,
    entry: String,
    outputs: Vec<String>,
    state_schema: Arc<StateSchema>,
    signature: String,
}

impl Graph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn executor(&self, id: &str) -> Option<&Arc<Executor>> {
        self.executors.get(id)
    }

    /// Executor ids in declaration order
    pub fn executor_ids(&self) -> &[String] {
        &self.order
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Executors whose output is surfaced to the caller
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn is_output(&self, id: &str) -> bool {
        self.outputs.iter().any(|o| o == id)
    }

    /// Distinct sources that must deliver before the executor runs
    ///
    /// 1 for executors fed only by ordinary edges; the source count of the
    /// widest fan-in feeding it otherwise. The runner joins each completed
    /// fan-in wave into a single message, so the executor is ready as soon
    /// as that message is in its inbox.
    pub fn input_arity(&self, id: &str) -> usize {
        self.edges
            .iter()
            .filter_map(|edge| match edge {
                Edge::FanIn { sources, to } if to == id => {
                    Some(sources.iter().collect::<HashSet<_>>().len())
                }
                _ => None,
            })
            .max()
            .unwrap_or(1)
    }

    pub fn state_schema(&self) -> &Arc<StateSchema> {
        &self.state_schema
    }

    /// Hex digest of executor ids, kinds and edge topology
    pub fn signature(&self) -> &str {
        &self.signature
    }
}

/// Builder for `Graph`
#[derive(Default)]
pub struct GraphBuilder {
    executors: Vec<Executor>,
    entry: Option<String>,
    edges: Vec<Edge>,
    outputs: Option<Vec<String>>,
    state_schema: StateSchema,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_executor(mut self, executor: Executor) -> Self {
        self.executors.push(executor);
        self
    }

    pub fn set_start(mut self, id: impl Into<String>) -> Self {
        self.entry = Some(id.into());
        self
    }

    pub fn add_edge(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.with_edge(Edge::Direct {
            from: from.into(),
            to: to.into(),
        })
    }

    pub fn add_conditional_edge(
        self,
        from: impl Into<String>,
        to: impl Into<String>,
        condition: Condition,
    ) -> Self {
        self.with_edge(Edge::Conditional {
            from: from.into(),
            to: to.into(),
            condition,
        })
    }

    pub fn add_fan_out<I, S>(self, from: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_edge(Edge::FanOut {
            from: from.into(),
            targets: targets.into_iter().map(Into::into).collect(),
        })
    }

    pub fn add_fan_in<I, S>(self, sources: I, to: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_edge(Edge::FanIn {
            sources: sources.into_iter().map(Into::into).collect(),
            to: to.into(),
        })
    }

    pub fn add_switch<I, K, T>(
        self,
        from: impl Into<String>,
        selector: Selector,
        cases: I,
        default: Option<&str>,
    ) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Into<String>,
    {
        self.with_edge(Edge::Switch {
            from: from.into(),
            selector,
            cases: cases
                .into_iter()
                .map(|(case, target)| (case.into(), target.into()))
                .collect(),
            default: default.map(str::to_string),
        })
    }

    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Designate the output executors (defaults to executors without outgoing edges)
    pub fn with_outputs<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_state_schema(mut self, schema: StateSchema) -> Self {
        self.state_schema = schema;
        self
    }

    /// Validate and freeze the graph
    ///
    /// Fails with the first violation found.
    pub fn build(self) -> Result<Graph, GraphValidationError> {
        let entry = self.entry.ok_or(GraphValidationError::MissingEntry)?;

        let mut order = Vec::with_capacity(self.executors.len());
        let mut executors = HashMap::with_capacity(self.executors.len());
        for executor in self.executors {
            let id = executor.id().to_string();
            if executors.contains_key(&id) {
                return Err(GraphValidationError::DuplicateExecutor(id));
            }
            order.push(id.clone());
            executors.insert(id, Arc::new(executor));
        }

        if !executors.contains_key(&entry) {
            return Err(GraphValidationError::UnknownEntry(entry));
        }

        for (index, edge) in self.edges.iter().enumerate() {
            validate_edge(index, edge, &executors)?;
        }

        let outputs = match self.outputs {
            Some(outputs) => {
                if let Some(unknown) = outputs.iter().find(|id| !executors.contains_key(*id)) {
                    return Err(GraphValidationError::UnknownOutput(unknown.clone()));
                }
                outputs
            }
            None => {
                let with_successors: HashSet<&str> =
                    self.edges.iter().flat_map(|e| e.origins()).collect();
                order
                    .iter()
                    .filter(|id| !with_successors.contains(id.as_str()))
                    .cloned()
                    .collect()
            }
        };

        let reachable = reachable_from(&entry, &self.edges);
        if let Some(orphan) = order.iter().find(|id| !reachable.contains(id.as_str())) {
            return Err(GraphValidationError::Unreachable(orphan.clone()));
        }

        let signature = compute_signature(&entry, &executors, &self.edges);
        log::debug!(
            "Built graph with {} executors and {} edges (signature {})",
            order.len(),
            self.edges.len(),
            signature
        );

        Ok(Graph {
            executors,
            order,
            edges: self.edges,
            entry,
            outputs,
            state_schema: Arc::new(self.state_schema),
            signature,
        })
    }
}

fn validate_edge(
    index: usize,
    edge: &Edge,
    executors: &HashMap<String, Arc<Executor>>,
) -> Result<(), GraphValidationError> {
    if let Some(missing) = edge
        .origins()
        .into_iter()
        .chain(edge.destinations())
        .find(|id| !executors.contains_key(*id))
    {
        return Err(GraphValidationError::DanglingEdge {
            edge: index,
            executor: missing.to_string(),
        });
    }

    match edge {
        Edge::FanIn { sources, to } => {
            let mut distinct: HashSet<&String> = HashSet::with_capacity(sources.len());
            if let Some(repeated) = sources.iter().find(|s| !distinct.insert(*s)) {
                return Err(GraphValidationError::DuplicateFanInSource {
                    edge: index,
                    executor: repeated.clone(),
                });
            }
            if distinct.len() < 2 {
                return Err(GraphValidationError::FanInTooFewSources {
                    edge: index,
                    target: to.clone(),
                    count: distinct.len(),
                });
            }
        }
        Edge::FanOut { from, targets } if targets.is_empty() => {
            return Err(GraphValidationError::NoRoutingBranches {
                edge: index,
                from: from.clone(),
            });
        }
        Edge::Switch {
            from,
            cases,
            default,
            ..
        } if cases.is_empty() && default.is_none() => {
            return Err(GraphValidationError::NoRoutingBranches {
                edge: index,
                from: from.clone(),
            });
        }
        _ => {}
    }
    Ok(())
}

fn reachable_from<'a>(entry: &'a str, edges: &'a [Edge]) -> HashSet<&'a str> {
    let mut seen: HashSet<&str> = HashSet::from([entry]);
    let mut queue: VecDeque<&str> = VecDeque::from([entry]);

    while let Some(current) = queue.pop_front() {
        for edge in edges.iter().filter(|e| e.origins().contains(&current)) {
            for next in edge.destinations() {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
    }
    seen
}

fn compute_signature(
    entry: &str,
    executors: &HashMap<String, Arc<Executor>>,
    edges: &[Edge],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("entry:{}\n", entry).as_bytes());

    let mut ids: Vec<&String> = executors.keys().collect();
    ids.sort();
    for id in ids {
        hasher.update(format!("executor:{}:{}\n", id, executors[id].kind_name()).as_bytes());
    }

    for (index, edge) in edges.iter().enumerate() {
        let detail = match edge {
            Edge::Conditional { condition, .. } => condition.describe().to_string(),
            Edge::Switch {
                selector,
                cases,
                default,
                ..
            } => {
                let cases: Vec<String> = cases.iter().map(|(c, t)| format!("{}={}", c, t)).collect();
                format!(
                    "{};{};default={}",
                    selector.describe(),
                    cases.join(","),
                    default.as_deref().unwrap_or("")
                )
            }
            _ => String::new(),
        };
        hasher.update(
            format!(
                "edge:{}:{}:{}->{}:{}\n",
                index,
                edge.kind_name(),
                edge.origins().join(","),
                edge.destinations().join(","),
                detail
            )
            .as_bytes(),
        );
    }

    format!("{:x}", hasher.finalize())
}
