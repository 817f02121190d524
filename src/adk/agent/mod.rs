// SPDX-License-Identifier: MIT

//! Agent collaborator contract
//!
//! An agent-kind executor hands its input to an `Agent` as text. The agent
//! either answers once (`run`) or reports `AgentUpdate`s while it works and
//! then answers (`run_stream`). Provider clients implement `Agent` outside
//! this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use tokio::sync::mpsc;

pub type AgentResult = Result<String, Box<dyn Error + Send + Sync>>;

/// Progress reported by an agent before its final response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AgentUpdate {
    /// A fragment of the response text
    Delta(String),
    ToolCall { name: String, args: Value },
    ToolResult { name: String, result: Value },
    /// The complete response
    Response(String),
    Error(String),
}

#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, input: String) -> AgentResult;

    /// Streams updates into `updates`; the channel closes when this returns.
    /// Agents without incremental output report their result as a single
    /// `Response` or `Error` update.
    async fn run_stream(&self, input: String, updates: mpsc::Sender<AgentUpdate>) -> AgentResult {
        let outcome = self.run(input).await;
        let update = match &outcome {
            Ok(text) => AgentUpdate::Response(text.clone()),
            Err(e) => AgentUpdate::Error(e.to_string()),
        };
        // A dropped receiver only means nobody is watching
        let _ = updates.send(update).await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Agent for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn run(&self, input: String) -> AgentResult {
            if input.is_empty() {
                return Err("nothing to say".into());
            }
            Ok(format!("{}!", input))
        }
    }

    #[tokio::test]
    async fn test_blocking_agent_streams_one_response() {
        let (tx, mut rx) = mpsc::channel(4);

        assert_eq!(Echo.run_stream("hi".into(), tx).await.unwrap(), "hi!");
        assert_eq!(rx.recv().await, Some(AgentUpdate::Response("hi!".into())));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_failure_is_reported_as_update() {
        let (tx, mut rx) = mpsc::channel(4);

        assert!(Echo.run_stream(String::new(), tx).await.is_err());
        assert_eq!(rx.recv().await, Some(AgentUpdate::Error("nothing to say".into())));
    }

    #[tokio::test]
    async fn test_closed_receiver_still_returns_result() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        assert_eq!(Echo.run_stream("hi".into(), tx).await.unwrap(), "hi!");
    }

    #[test]
    fn test_update_wire_shape() {
        let json = serde_json::to_value(AgentUpdate::Delta("hel".into())).unwrap();
        assert_eq!(json, serde_json::json!({"type": "delta", "data": "hel"}));
    }
}
