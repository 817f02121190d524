// SPDX-License-Identifier: MIT

//! Tool collaborator contract
//!
//! Function executors wrap a `Tool`. The tool receives the routed payload as
//! structured input plus an `ExecutorContext` giving it access to the run's
//! shared state, explicit outputs and the cancellation signal.

use crate::kinetic::workflow::executor::ExecutorContext;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::error::Error;
use std::future::Future;

pub type ToolResult = Result<Value, Box<dyn Error + Send + Sync>>;

/// Trait for tools that can be called by function executors.
///
/// `name()`, `description()` and `schema()` return borrowed data; store the
/// values in struct fields (or statics) rather than building them per call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool name (must be unique within a registry)
    fn name(&self) -> &str;

    /// Returns a human-readable description of what the tool does
    fn description(&self) -> &str;

    /// Returns the JSON schema for the tool's input parameters
    fn schema(&self) -> &Value;

    /// Execute the tool with the given input and return the result
    async fn execute(&self, input: Value, ctx: &ExecutorContext) -> ToolResult;
}

type Handler = Box<dyn Fn(Value, ExecutorContext) -> BoxFuture<'static, ToolResult> + Send + Sync>;

/// Tool backed by an async closure
pub struct FnTool {
    name: String,
    description: String,
    schema: Value,
    handler: Handler,
}

impl FnTool {
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value, ExecutorContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        let name = name.into();
        Self {
            description: format!("Function tool: {}", name),
            name,
            schema: json!({ "type": "object" }),
            handler: Box::new(move |input, ctx| Box::pin(handler(input, ctx))),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> &Value {
        &self.schema
    }

    async fn execute(&self, input: Value, ctx: &ExecutorContext) -> ToolResult {
        (self.handler)(input, ctx.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_tool_executes_closure() {
        let tool = FnTool::new("double", |input: Value, _ctx| async move {
            let n = input.as_i64().ok_or("expected a number")?;
            ToolResult::Ok(json!(n * 2))
        });
        let ctx = ExecutorContext::detached("double");

        assert_eq!(tool.name(), "double");
        assert_eq!(tool.execute(json!(21), &ctx).await.unwrap(), json!(42));
        assert!(tool.execute(json!("x"), &ctx).await.is_err());
    }

    #[test]
    fn test_fn_tool_metadata() {
        let tool = FnTool::new("noop", |input: Value, _ctx| async move { ToolResult::Ok(input) })
            .with_description("Does nothing")
            .with_schema(json!({"type": "string"}));

        assert_eq!(tool.description(), "Does nothing");
        assert_eq!(tool.schema()["type"], "string");
    }
}
