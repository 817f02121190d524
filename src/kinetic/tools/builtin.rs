// SPDX-License-Identifier: MIT

//! Built-in function tools
//!
//! Small data-shaping tools usable from workflow files without writing Rust.

use crate::adk::tool::{Tool, ToolResult};
use crate::kinetic::workflow::executor::{value_to_text, ExecutorContext};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

// --- Static schemas ---

static ANY_SCHEMA: Lazy<Value> = Lazy::new(|| json!({}));

static JOIN_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "oneOf": [
            { "type": "array" },
            {
                "type": "object",
                "properties": {
                    "items": {
                        "type": "array",
                        "description": "Values to join"
                    },
                    "separator": {
                        "type": "string",
                        "description": "Separator placed between items (default \", \")"
                    }
                },
                "required": ["items"]
            }
        ]
    })
});

static SET_STATE_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "description": "Every field is written to the shared state field of the same name"
    })
});

/// Every built-in tool
pub fn all() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(EchoTool),
        Arc::new(UppercaseTool),
        Arc::new(JoinTool),
        Arc::new(SetStateTool),
    ]
}

/// Returns its input unchanged
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Returns the input unchanged"
    }

    fn schema(&self) -> &Value {
        &ANY_SCHEMA
    }

    async fn execute(&self, input: Value, _ctx: &ExecutorContext) -> ToolResult {
        Ok(input)
    }
}

pub struct UppercaseTool;

#[async_trait]
impl Tool for UppercaseTool {
    fn name(&self) -> &str {
        "uppercase"
    }

    fn description(&self) -> &str {
        "Converts the input to upper-case text"
    }

    fn schema(&self) -> &Value {
        &ANY_SCHEMA
    }

    async fn execute(&self, input: Value, _ctx: &ExecutorContext) -> ToolResult {
        Ok(Value::String(value_to_text(&input).to_uppercase()))
    }
}

#[derive(Debug, Deserialize)]
struct JoinArgs {
    items: Vec<Value>,
    #[serde(default)]
    separator: Option<String>,
}

/// Joins the text of array items, e.g. the collected results of a fan-in
pub struct JoinTool;

#[async_trait]
impl Tool for JoinTool {
    fn name(&self) -> &str {
        "join"
    }

    fn description(&self) -> &str {
        "Joins a list of values into one string"
    }

    fn schema(&self) -> &Value {
        &JOIN_SCHEMA
    }

    async fn execute(&self, input: Value, _ctx: &ExecutorContext) -> ToolResult {
        let args = match input {
            Value::Array(items) => JoinArgs {
                items,
                separator: None,
            },
            other => serde_json::from_value(other)
                .map_err(|e| format!("join expects an array or {{items, separator}}: {}", e))?,
        };
        let separator = args.separator.as_deref().unwrap_or(", ");
        let joined = args
            .items
            .iter()
            .map(value_to_text)
            .collect::<Vec<_>>()
            .join(separator);
        Ok(Value::String(joined))
    }
}

/// Writes the fields of an object input to shared state and passes it on
pub struct SetStateTool;

#[async_trait]
impl Tool for SetStateTool {
    fn name(&self) -> &str {
        "set_state"
    }

    fn description(&self) -> &str {
        "Writes each field of the input object to shared state"
    }

    fn schema(&self) -> &Value {
        &SET_STATE_SCHEMA
    }

    async fn execute(&self, input: Value, ctx: &ExecutorContext) -> ToolResult {
        let fields = input
            .as_object()
            .ok_or("set_state expects an object input")?;
        let rejected: Vec<&str> = fields
            .iter()
            .filter(|(key, value)| !ctx.set_state(key.as_str(), (*value).clone()))
            .map(|(key, _)| key.as_str())
            .collect();
        if !rejected.is_empty() {
            return Err(format!("state fields reject the given values: {}", rejected.join(", ")).into());
        }
        Ok(input)
    }
}
