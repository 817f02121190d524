// SPDX-License-Identifier: MIT

//! Run status and lifecycle events

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::adk::agent::AgentUpdate;
use crate::adk::error::RunFailure;

/// Status of a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    InProgress,
    InProgressPendingRequests,
    Idle,
    IdleWithPendingRequests,
    Failed,
}

impl RunStatus {
    /// Whether the run has stopped advancing on its own
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Idle | RunStatus::IdleWithPendingRequests | RunStatus::Failed
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::InProgress => "IN_PROGRESS",
            RunStatus::InProgressPendingRequests => "IN_PROGRESS_PENDING_REQUESTS",
            RunStatus::Idle => "IDLE",
            RunStatus::IdleWithPendingRequests => "IDLE_WITH_PENDING_REQUESTS",
            RunStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Events emitted by a run, in the order they happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowStarted {
        workflow_id: String,
        run_id: String,
    },
    WorkflowStatus {
        state: RunStatus,
    },
    SuperstepStarted {
        superstep: u32,
    },
    SuperstepCompleted {
        superstep: u32,
    },
    ExecutorInvoked {
        executor_id: String,
        superstep: u32,
    },
    ExecutorCompleted {
        executor_id: String,
        superstep: u32,
    },
    ExecutorFailed {
        executor_id: String,
        error: String,
    },
    /// Final response of an agent executor
    AgentRun {
        executor_id: String,
        response: Value,
    },
    /// Incremental update from a streaming agent
    AgentRunUpdate {
        executor_id: String,
        update: AgentUpdate,
    },
    RequestInfo {
        request_id: String,
        executor_id: String,
        data: Value,
    },
    WorkflowOutput {
        executor_id: String,
        data: Value,
    },
    WorkflowFailed {
        error: RunFailure,
    },
}

impl WorkflowEvent {
    /// Whether this event ends a drive of the run
    pub fn is_terminal(&self) -> bool {
        match self {
            WorkflowEvent::WorkflowStatus { state } => {
                matches!(state, RunStatus::Idle | RunStatus::IdleWithPendingRequests)
            }
            WorkflowEvent::WorkflowFailed { .. } => true,
            _ => false,
        }
    }
}
