// SPDX-License-Identifier: MIT

//! Workflow builder - orchestrates workflow construction
//!
//! This module provides the high-level Builder that loads workflow definitions
//! and compiles them into runnable workflows. Function and agent executors are
//! resolved by name through the registries; nested workflow files are
//! resolved relative to the file that references them.

use futures::future::{BoxFuture, FutureExt};
use std::path::{Path, PathBuf};

use crate::adk::error::{GraphValidationError, Result, WorkflowError};
use crate::kinetic::tools::builtin::EchoTool;
use crate::kinetic::workflow::executor::{Executor, ExecutorKind};
use crate::kinetic::workflow::graph::{Condition, Edge, GraphBuilder, Selector};
use crate::kinetic::workflow::loader::WorkflowLoader;
use crate::kinetic::workflow::normalizer::normalize_to_graph;
use crate::kinetic::workflow::registry::{AgentRegistry, ToolRegistry};
use crate::kinetic::workflow::runner::Workflow;
use crate::kinetic::workflow::types::{EdgeDefinition, Endpoints, ExecutorDefinition, WorkflowDefinition};

/// High-level builder for constructing workflows from YAML definitions
pub struct Builder {
    loader: WorkflowLoader,
    tools: ToolRegistry,
    agents: AgentRegistry,
}

impl Builder {
    pub fn new(tools: ToolRegistry, agents: AgentRegistry) -> Self {
        Self {
            loader: WorkflowLoader::new(),
            tools,
            agents,
        }
    }

    /// Build a workflow from a YAML file path
    pub async fn build_workflow<P: AsRef<Path>>(&self, file_path: P) -> Result<Workflow> {
        self.build_file(file_path.as_ref().to_path_buf(), Vec::new())
            .await
    }

    /// Build a workflow from YAML text; nested files resolve against `base_dir`
    pub async fn build_from_yaml(&self, content: &str, base_dir: &Path) -> Result<Workflow> {
        let def = WorkflowLoader::parse_yaml(content)?;
        self.build_from_def(&def, base_dir, &[]).await
    }

    fn build_file(&self, path: PathBuf, ancestors: Vec<PathBuf>) -> BoxFuture<'_, Result<Workflow>> {
        async move {
            let def = self.loader.load_workflow(&path)?;
            let canonical = std::fs::canonicalize(&path)?;
            if ancestors.contains(&canonical) {
                return Err(WorkflowError::CyclicReference(path.display().to_string()).into());
            }

            let mut chain = ancestors;
            chain.push(canonical);
            let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            self.build_from_def(&def, &base_dir, &chain).await
        }
        .boxed()
    }

    /// Build a workflow from a parsed definition
    pub async fn build_from_def(
        &self,
        def: &WorkflowDefinition,
        base_dir: &Path,
        ancestors: &[PathBuf],
    ) -> Result<Workflow> {
        // Normalize all workflow kinds to graph format
        let graph_def = normalize_to_graph(def)?;

        log::info!(
            "Normalized '{}' workflow '{}' to graph with {} executors",
            def.kind,
            def.name,
            graph_def.executors.len()
        );

        let start = graph_def
            .start
            .clone()
            .ok_or(GraphValidationError::MissingEntry)?;
        let mut graph = GraphBuilder::new()
            .set_start(start)
            .with_state_schema(graph_def.state.clone());

        for executor_def in &graph_def.executors {
            let executor = self
                .build_executor(executor_def, base_dir, ancestors)
                .await?;
            graph = graph.add_executor(executor);
        }
        for edge_def in &graph_def.edges {
            graph = graph.with_edge(compile_edge(edge_def)?);
        }
        if let Some(outputs) = &graph_def.outputs {
            graph = graph.with_outputs(outputs.iter().cloned());
        }

        let graph = graph.build()?;
        log::info!(
            "Built workflow '{}' with {} executors and {} edges",
            graph_def.name,
            graph.executor_ids().len(),
            graph.edges().len()
        );

        Ok(Workflow::new(graph_def.name.clone(), graph)
            .with_config(graph_def.config.clone().with_env_overrides()))
    }

    async fn build_executor(
        &self,
        def: &ExecutorDefinition,
        base_dir: &Path,
        ancestors: &[PathBuf],
    ) -> Result<Executor> {
        let executor = match def.kind.as_str() {
            "function" => {
                let name = required(def, "tool", &def.tool)?;
                let tool = self
                    .tools
                    .get(name)
                    .await
                    .ok_or_else(|| WorkflowError::ToolNotFound(name.to_string()))?;
                Executor::new(&def.id, ExecutorKind::Function(tool))
            }
            "agent" => {
                let name = required(def, "agent", &def.agent)?;
                let agent = self
                    .agents
                    .get(name)
                    .await
                    .ok_or_else(|| WorkflowError::AgentNotFound(name.to_string()))?;
                Executor::new(&def.id, ExecutorKind::Agent(agent))
            }
            "workflow" => {
                let file = required(def, "file", &def.file)?;
                let nested = self
                    .build_file(base_dir.join(file), ancestors.to_vec())
                    .await?;
                Executor::workflow(&def.id, nested)
            }
            "request_info" => Executor::request_info(&def.id, def.prompt.clone()),
            "passthrough" => Executor::function(&def.id, EchoTool),
            other => {
                return Err(WorkflowError::UnknownExecutorKind {
                    executor: def.id.clone(),
                    kind: other.to_string(),
                }
                .into())
            }
        };
        log::debug!("Compiled {} executor '{}'", executor.kind_name(), def.id);
        Ok(executor)
    }
}

fn required<'a>(
    def: &ExecutorDefinition,
    field: &str,
    value: &'a Option<String>,
) -> std::result::Result<&'a str, WorkflowError> {
    value.as_deref().ok_or_else(|| WorkflowError::MissingField {
        executor: def.id.clone(),
        kind: def.kind.clone(),
        field: field.to_string(),
    })
}

/// Translate an edge definition into a graph edge by the shape of its endpoints
fn compile_edge(def: &EdgeDefinition) -> std::result::Result<Edge, WorkflowError> {
    let invalid = |message: &str| WorkflowError::InvalidEdge {
        from: def.from.to_vec().join(", "),
        message: message.to_string(),
    };

    if let Some(selector) = &def.switch {
        let Endpoints::One(from) = &def.from else {
            return Err(invalid("switch edges need a single source"));
        };
        if def.to.is_some() || def.when.is_some() {
            return Err(invalid("switch edges route through 'cases', not 'to' or 'when'"));
        }
        return Ok(Edge::Switch {
            from: from.clone(),
            selector: Selector::path(selector.clone()),
            cases: def
                .cases
                .iter()
                .map(|(case, target)| (case.clone(), target.clone()))
                .collect(),
            default: def.default.clone(),
        });
    }
    if !def.cases.is_empty() || def.default.is_some() {
        return Err(invalid("'cases' and 'default' require 'switch'"));
    }

    let to = def.to.as_ref().ok_or_else(|| invalid("missing 'to'"))?;
    match (&def.from, to, &def.when) {
        (Endpoints::One(from), Endpoints::One(to), None) => Ok(Edge::Direct {
            from: from.clone(),
            to: to.clone(),
        }),
        (Endpoints::One(from), Endpoints::One(to), Some(when)) => Ok(Edge::Conditional {
            from: from.clone(),
            to: to.clone(),
            condition: Condition::parse(when)?,
        }),
        (Endpoints::One(from), Endpoints::Many(targets), None) => Ok(Edge::FanOut {
            from: from.clone(),
            targets: targets.clone(),
        }),
        (Endpoints::Many(sources), Endpoints::One(to), None) => Ok(Edge::FanIn {
            sources: sources.clone(),
            to: to.clone(),
        }),
        (Endpoints::Many(_), Endpoints::Many(_), _) => {
            Err(invalid("many-to-many edges are not supported"))
        }
        _ => Err(invalid("'when' applies to one-to-one edges only")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::agent::Agent;
    use crate::adk::error::KineticError;
    use crate::kinetic::workflow::event::RunStatus;
    use async_trait::async_trait;
    use serde_json::json;
    use std::error::Error;
    use std::sync::Arc;

    struct ShoutAgent;

    #[async_trait]
    impl Agent for ShoutAgent {
        fn name(&self) -> &str {
            "shout"
        }

        async fn run(&self, input: String) -> std::result::Result<String, Box<dyn Error + Send + Sync>> {
            Ok(format!("{}!", input))
        }
    }

    async fn builder() -> Builder {
        let agents = AgentRegistry::new();
        agents.register(Arc::new(ShoutAgent)).await;
        Builder::new(ToolRegistry::with_builtins().await, agents)
    }

    fn edge(yaml: &str) -> EdgeDefinition {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[tokio::test]
    async fn test_build_and_run_graph() {
        let yaml = r#"
name: Shout
start: upper
executors:
  - { id: upper, kind: function, tool: uppercase }
  - { id: shout, kind: agent, agent: shout }
edges:
  - { from: upper, to: shout }
"#;
        let workflow = builder()
            .await
            .build_from_yaml(yaml, Path::new("."))
            .await
            .unwrap();
        let run = workflow.run(json!("hello")).await.unwrap();

        assert_eq!(workflow.id(), "Shout");
        assert_eq!(run.status(), RunStatus::Idle);
        assert_eq!(run.outputs(), &[json!("HELLO!")]);
    }

    #[tokio::test]
    async fn test_unknown_executor_kind_returns_error() {
        let yaml = "name: X\nstart: a\nexecutors:\n  - { id: a, kind: teleport }\n";
        let result = builder().await.build_from_yaml(yaml, Path::new(".")).await;
        assert!(matches!(
            result,
            Err(KineticError::Workflow(WorkflowError::UnknownExecutorKind { .. }))
        ));
    }

    #[tokio::test]
    async fn test_missing_field_and_unregistered_names() {
        let b = builder().await;

        let no_tool = "name: X\nstart: a\nexecutors:\n  - { id: a, kind: function }\n";
        let err = b.build_from_yaml(no_tool, Path::new(".")).await.unwrap_err();
        assert!(err.to_string().contains("missing field 'tool'"));

        let bad_tool = "name: X\nstart: a\nexecutors:\n  - { id: a, kind: function, tool: nope }\n";
        assert!(matches!(
            b.build_from_yaml(bad_tool, Path::new(".")).await,
            Err(KineticError::Workflow(WorkflowError::ToolNotFound(_)))
        ));

        let bad_agent = "name: X\nstart: a\nexecutors:\n  - { id: a, kind: agent, agent: nope }\n";
        assert!(matches!(
            b.build_from_yaml(bad_agent, Path::new(".")).await,
            Err(KineticError::Workflow(WorkflowError::AgentNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_missing_start_returns_error() {
        let yaml = "name: X\nexecutors:\n  - { id: a, kind: passthrough }\n";
        assert!(matches!(
            builder().await.build_from_yaml(yaml, Path::new(".")).await,
            Err(KineticError::Graph(GraphValidationError::MissingEntry))
        ));
    }

    #[test]
    fn test_compile_edge_shapes() {
        assert!(matches!(compile_edge(&edge("{from: a, to: b}")), Ok(Edge::Direct { .. })));
        assert!(matches!(
            compile_edge(&edge("{from: a, to: b, when: 'output > 3'}")),
            Ok(Edge::Conditional { .. })
        ));
        assert!(matches!(
            compile_edge(&edge("{from: a, to: [b, c]}")),
            Ok(Edge::FanOut { .. })
        ));
        assert!(matches!(
            compile_edge(&edge("{from: [a, b], to: c}")),
            Ok(Edge::FanIn { .. })
        ));
        assert!(matches!(
            compile_edge(&edge("{from: a, switch: output.kind, cases: {x: b}, default: c}")),
            Ok(Edge::Switch { .. })
        ));
    }

    #[test]
    fn test_compile_edge_rejects_bad_shapes() {
        for yaml in [
            "{from: a}",
            "{from: [a, b], to: [c, d]}",
            "{from: a, to: [b, c], when: 'output'}",
            "{from: [a, b], switch: output}",
            "{from: a, to: b, cases: {x: c}}",
        ] {
            assert!(
                matches!(compile_edge(&edge(yaml)), Err(WorkflowError::InvalidEdge { .. })),
                "{} should be rejected",
                yaml
            );
        }
        assert!(matches!(
            compile_edge(&edge("{from: a, to: b, when: 'output =='}")),
            Err(WorkflowError::InvalidCondition { .. })
        ));
    }

    #[tokio::test]
    async fn test_nested_workflow_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(
            dir.path().join("sub").join("inner.yaml"),
            "name: Inner\nkind: Sequential\nsteps:\n  - { id: up, kind: function, tool: uppercase }\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("outer.yaml"),
            "name: Outer\nstart: inner\nexecutors:\n  - { id: inner, kind: workflow, file: sub/inner.yaml }\n",
        )
        .unwrap();

        let workflow = builder()
            .await
            .build_workflow(dir.path().join("outer.yaml"))
            .await
            .unwrap();
        let run = workflow.run(json!("quiet")).await.unwrap();
        assert_eq!(run.outputs(), &[json!("QUIET")]);
    }

    #[tokio::test]
    async fn test_self_referencing_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("loop.yaml"),
            "name: Loop\nstart: me\nexecutors:\n  - { id: me, kind: workflow, file: loop.yaml }\n",
        )
        .unwrap();

        let result = builder()
            .await
            .build_workflow(dir.path().join("loop.yaml"))
            .await;
        assert!(matches!(
            result,
            Err(KineticError::Workflow(WorkflowError::CyclicReference(_)))
        ));
    }
}
