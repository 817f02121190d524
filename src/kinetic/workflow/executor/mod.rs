// SPDX-License-Identifier: MIT

//! Executors: the units of work a graph connects
//!
//! The set of kinds is closed. Function executors wrap a `Tool`, agent
//! executors wrap an `Agent`, workflow executors run a nested `Workflow` to
//! completion, and request-info executors suspend the run until a response
//! arrives from outside.

mod context;

pub use context::ExecutorContext;

use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::adk::agent::{Agent, AgentUpdate};
use crate::adk::error::ExecutorInvocationError;
use crate::adk::tool::Tool;
use crate::kinetic::workflow::event::RunStatus;
use crate::kinetic::workflow::runner::Workflow;

/// Agent updates forwarded to the runner, tagged with the executor id
pub(crate) type UpdateSender = mpsc::UnboundedSender<(String, AgentUpdate)>;

/// The work an executor performs
#[derive(Clone)]
pub enum ExecutorKind {
    Function(Arc<dyn Tool>),
    Agent(Arc<dyn Agent>),
    Workflow(Arc<Workflow>),
    RequestInfo { prompt: Option<String> },
}

/// A graph node
#[derive(Clone)]
pub struct Executor {
    id: String,
    kind: ExecutorKind,
}

/// What a single invocation produced
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// Output to route along the executor's edges
    Output(Value),
    /// Payload of a request awaiting an external response
    Request(Value),
}

impl Executor {
    pub fn new(id: impl Into<String>, kind: ExecutorKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn function(id: impl Into<String>, tool: impl Tool + 'static) -> Self {
        Self::new(id, ExecutorKind::Function(Arc::new(tool)))
    }

    pub fn agent(id: impl Into<String>, agent: impl Agent + 'static) -> Self {
        Self::new(id, ExecutorKind::Agent(Arc::new(agent)))
    }

    pub fn workflow(id: impl Into<String>, workflow: Workflow) -> Self {
        Self::new(id, ExecutorKind::Workflow(Arc::new(workflow)))
    }

    pub fn request_info(id: impl Into<String>, prompt: Option<String>) -> Self {
        Self::new(id, ExecutorKind::RequestInfo { prompt })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &ExecutorKind {
        &self.kind
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ExecutorKind::Function(_) => "function",
            ExecutorKind::Agent(_) => "agent",
            ExecutorKind::Workflow(_) => "workflow",
            ExecutorKind::RequestInfo { .. } => "request_info",
        }
    }

    pub fn is_agent(&self) -> bool {
        matches!(self.kind, ExecutorKind::Agent(_))
    }

    /// Run one invocation
    ///
    /// Returns a boxed future so nested workflows can recurse into the runner.
    pub(crate) fn invoke(
        &self,
        input: Value,
        ctx: ExecutorContext,
        updates: UpdateSender,
    ) -> BoxFuture<'_, Result<Invocation, ExecutorInvocationError>> {
        async move {
            match &self.kind {
                ExecutorKind::Function(tool) => tool
                    .execute(input, &ctx)
                    .await
                    .map(Invocation::Output)
                    .map_err(|e| self.error(e)),
                ExecutorKind::Agent(agent) => self
                    .invoke_agent(agent.as_ref(), input, updates)
                    .await
                    .map(Invocation::Output),
                ExecutorKind::Workflow(workflow) => self
                    .invoke_workflow(workflow, input, &ctx)
                    .await
                    .map(Invocation::Output),
                ExecutorKind::RequestInfo { prompt } => Ok(Invocation::Request(match prompt {
                    Some(prompt) => json!({ "prompt": prompt, "data": input }),
                    None => input,
                })),
            }
        }
        .boxed()
    }

    async fn invoke_agent(
        &self,
        agent: &dyn Agent,
        input: Value,
        updates: UpdateSender,
    ) -> Result<Value, ExecutorInvocationError> {
        let (tx, mut rx) = mpsc::channel::<AgentUpdate>(32);
        let forward = async {
            while let Some(update) = rx.recv().await {
                let _ = updates.send((self.id.clone(), update));
            }
        };

        let (result, ()) = tokio::join!(agent.run_stream(value_to_text(&input), tx), forward);
        let response = result.map_err(|e| self.error(e))?;
        Ok(parse_response(response))
    }

    async fn invoke_workflow(
        &self,
        workflow: &Workflow,
        input: Value,
        ctx: &ExecutorContext,
    ) -> Result<Value, ExecutorInvocationError> {
        let mut run = workflow
            .start()
            .with_cancellation(ctx.cancellation_token().child_token());
        run.run(input).await.map_err(|e| self.error(e))?;

        match run.status() {
            RunStatus::Idle => {
                let mut outputs = run.outputs().to_vec();
                log::debug!(
                    "Nested workflow '{}' finished with {} output(s)",
                    workflow.id(),
                    outputs.len()
                );
                Ok(if outputs.len() == 1 {
                    outputs.remove(0)
                } else {
                    Value::Array(outputs)
                })
            }
            RunStatus::IdleWithPendingRequests => Err(self.error(format!(
                "nested workflow '{}' is waiting on {} request(s)",
                workflow.id(),
                run.pending_requests().len()
            ))),
            status => Err(self.error(
                run.failure()
                    .map(|f| f.message.clone())
                    .unwrap_or_else(|| format!("nested workflow ended as {}", status)),
            )),
        }
    }

    fn error(&self, err: impl fmt::Display) -> ExecutorInvocationError {
        ExecutorInvocationError::new(&self.id, err.to_string())
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("id", &self.id)
            .field("kind", &self.kind_name())
            .finish()
    }
}

/// Agent responses that are JSON objects or arrays are routed as structured values
fn parse_response(response: String) -> Value {
    match serde_json::from_str::<Value>(&response) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => value,
        _ => Value::String(response),
    }
}

/// Convert a JSON value to readable text
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            // If object has a single "result" or "answer" key, extract it
            if obj.len() == 1 {
                if let Some(v) = obj
                    .get("result")
                    .or(obj.get("answer"))
                    .or(obj.get("response"))
                {
                    return value_to_text(v);
                }
            }
            obj.iter()
                .map(|(k, v)| format!("**{}**: {}", k, value_to_text(v)))
                .collect::<Vec<_>>()
                .join("\n")
        }
        Value::Array(arr) => arr
            .iter()
            .map(|v| format!("- {}", value_to_text(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "".to_string(),
    }
}
