// SPDX-License-Identifier: MIT

//! Typed error handling for kinetic-flow
//!
//! Build-time problems (graph validation, workflow files, checkpoint
//! loading) are returned synchronously as `KineticError`. Failures inside a
//! running executor never cross the run boundary as errors: the runner turns
//! them into a `RunFailure` carried by a `WorkflowFailed` event.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KineticError>;

/// Top-level error type for kinetic-flow
#[derive(Debug, Error)]
pub enum KineticError {
    /// The graph violates a structural invariant
    #[error("Graph validation failed: {0}")]
    Graph(#[from] GraphValidationError),

    /// Workflow definition errors (files, registries, conditions)
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Checkpoint persistence or compatibility errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// A response was supplied for a request that is not outstanding
    #[error("Unknown request id: {request_id}")]
    UnknownRequest { request_id: String },

    /// The run cannot accept the operation in its current status
    #[error("Run cannot {action} while {status}")]
    InvalidRunState { action: String, status: String },

    /// An executor invocation failed
    #[error(transparent)]
    Invocation(#[from] ExecutorInvocationError),

    /// The run was cancelled by the caller
    #[error("Workflow run cancelled")]
    Cancelled,

    /// The run exceeded its superstep budget
    #[error("Max supersteps reached: {limit}")]
    SuperstepLimit { limit: u32 },

    /// Configuration errors (bad env vars, invalid config blocks)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Structural violations found by `GraphBuilder::build`
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphValidationError {
    #[error("no entry executor was set")]
    MissingEntry,

    #[error("entry executor '{0}' is not defined")]
    UnknownEntry(String),

    #[error("executor id '{0}' is defined more than once")]
    DuplicateExecutor(String),

    #[error("edge #{edge} references undefined executor '{executor}'")]
    DanglingEdge { edge: usize, executor: String },

    #[error("fan-in edge #{edge} into '{target}' has {count} distinct source(s), at least 2 are required")]
    FanInTooFewSources {
        edge: usize,
        target: String,
        count: usize,
    },

    #[error("fan-in edge #{edge} lists source '{executor}' more than once")]
    DuplicateFanInSource { edge: usize, executor: String },

    #[error("edge #{edge} from '{from}' has no routing branches")]
    NoRoutingBranches { edge: usize, from: String },

    #[error("output executor '{0}' is not defined")]
    UnknownOutput(String),

    #[error("executor '{0}' is unreachable from the entry executor")]
    Unreachable(String),
}

/// Errors raised while loading and compiling workflow definitions
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Unknown workflow kind
    #[error("Unknown workflow kind: {0}")]
    UnknownKind(String),

    /// Unknown executor kind
    #[error("Unknown executor kind '{kind}' for executor '{executor}'")]
    UnknownExecutorKind { executor: String, kind: String },

    /// An executor definition lacks a field its kind requires
    #[error("Executor '{executor}' of kind '{kind}' is missing field '{field}'")]
    MissingField {
        executor: String,
        kind: String,
        field: String,
    },

    /// A pattern workflow (Sequential / Concurrent) has no steps
    #[error("{0} workflow has no steps")]
    EmptyPattern(String),

    /// File not found when loading workflow
    #[error("Workflow file not found: {0}")]
    FileNotFound(String),

    /// A nested workflow file includes itself
    #[error("Workflow file '{0}' references itself through nested workflows")]
    CyclicReference(String),

    /// Tool missing from the registry
    #[error("Tool '{0}' not found")]
    ToolNotFound(String),

    /// Agent missing from the registry
    #[error("Agent '{0}' not found")]
    AgentNotFound(String),

    /// A `when` expression could not be parsed
    #[error("Invalid condition '{condition}': {message}")]
    InvalidCondition { condition: String, message: String },

    /// An edge definition mixes incompatible fields
    #[error("Invalid edge from '{from}': {message}")]
    InvalidEdge { from: String, message: String },
}

/// Checkpoint persistence errors
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint '{0}' not found")]
    NotFound(String),

    /// The checkpoint was taken on a graph with a different shape
    #[error("Checkpoint '{checkpoint_id}' is incompatible with this graph (stored signature {stored}, graph signature {current})")]
    IncompatibleGraph {
        checkpoint_id: String,
        stored: String,
        current: String,
    },

    #[error("Checkpoint storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Failure raised from inside a single executor invocation
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Executor '{executor_id}' failed: {message}")]
pub struct ExecutorInvocationError {
    pub executor_id: String,
    pub message: String,
}

impl ExecutorInvocationError {
    pub fn new(executor_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            executor_id: executor_id.into(),
            message: message.into(),
        }
    }
}

/// Classification carried by a failed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// An executor raised an error
    Invocation,
    /// The caller cancelled the run
    Cancellation,
    /// The superstep budget was exhausted
    SuperstepLimit,
    /// A checkpoint could not be written
    Checkpoint,
}

/// Terminal failure details attached to `WorkflowEvent::WorkflowFailed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: FailureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<String>,
    pub message: String,
}

impl RunFailure {
    pub fn cancelled() -> Self {
        Self {
            kind: FailureKind::Cancellation,
            executor_id: None,
            message: KineticError::Cancelled.to_string(),
        }
    }
}

impl From<&ExecutorInvocationError> for RunFailure {
    fn from(err: &ExecutorInvocationError) -> Self {
        Self {
            kind: FailureKind::Invocation,
            executor_id: Some(err.executor_id.clone()),
            message: err.message.clone(),
        }
    }
}

impl From<&KineticError> for RunFailure {
    fn from(err: &KineticError) -> Self {
        match err {
            KineticError::Invocation(inner) => inner.into(),
            KineticError::Cancelled => Self::cancelled(),
            KineticError::SuperstepLimit { .. } => Self {
                kind: FailureKind::SuperstepLimit,
                executor_id: None,
                message: err.to_string(),
            },
            KineticError::Checkpoint(_) => Self {
                kind: FailureKind::Checkpoint,
                executor_id: None,
                message: err.to_string(),
            },
            other => Self {
                kind: FailureKind::Invocation,
                executor_id: None,
                message: other.to_string(),
            },
        }
    }
}

impl KineticError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create from a generic message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    pub(crate) fn invalid_state(action: &str, status: impl std::fmt::Display) -> Self {
        Self::InvalidRunState {
            action: action.to_string(),
            status: status.to_string(),
        }
    }
}

impl From<&str> for KineticError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for KineticError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

// Collaborators (tools, agents) report failures as boxed errors
impl From<Box<dyn std::error::Error + Send + Sync>> for KineticError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_error_converts() {
        let err: KineticError = GraphValidationError::Unreachable("orphan".to_string()).into();
        assert!(err.to_string().contains("orphan"));
        assert!(matches!(err, KineticError::Graph(_)));
    }

    #[test]
    fn test_invocation_failure_keeps_executor() {
        let err = ExecutorInvocationError::new("writer", "model timed out");
        let failure = RunFailure::from(&err);
        assert_eq!(failure.kind, FailureKind::Invocation);
        assert_eq!(failure.executor_id.as_deref(), Some("writer"));
        assert_eq!(failure.message, "model timed out");
    }

    #[test]
    fn test_failure_kind_classification() {
        let limit = RunFailure::from(&KineticError::SuperstepLimit { limit: 3 });
        assert_eq!(limit.kind, FailureKind::SuperstepLimit);

        let cancelled = RunFailure::from(&KineticError::Cancelled);
        assert_eq!(cancelled.kind, FailureKind::Cancellation);

        let checkpoint =
            RunFailure::from(&KineticError::from(CheckpointError::Storage("disk".into())));
        assert_eq!(checkpoint.kind, FailureKind::Checkpoint);
    }

    #[test]
    fn test_failure_serializes_snake_case() {
        let json = serde_json::to_value(RunFailure::cancelled()).unwrap();
        assert_eq!(json["kind"], "cancellation");
        assert!(json.get("executor_id").is_none());
    }
}
