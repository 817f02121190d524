// SPDX-License-Identifier: MIT

//! Checkpoints: persisted snapshots of a run
//!
//! The engine serializes a `Checkpoint` to bytes and hands them to a
//! `CheckpointStorage`. A checkpoint records the signature of the graph it
//! was taken on and only resumes against a graph with the same signature.

mod file;
mod memory;

pub use file::FileCheckpointStorage;
pub use memory::InMemoryCheckpointStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adk::error::CheckpointError;
use crate::kinetic::workflow::graph::Graph;
use crate::kinetic::workflow::runner::RunState;

/// Snapshot of a run at the end of a superstep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Assigned by the storage; not part of the stored bytes
    #[serde(default, skip_serializing)]
    pub id: String,
    pub workflow_id: String,
    pub timestamp: DateTime<Utc>,
    pub graph_signature: String,
    pub state: RunState,
}

impl Checkpoint {
    pub fn new(workflow_id: impl Into<String>, graph: &Graph, state: RunState) -> Self {
        Self {
            id: String::new(),
            workflow_id: workflow_id.into(),
            timestamp: Utc::now(),
            graph_signature: graph.signature().to_string(),
            state,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CheckpointError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn decode(id: &str, bytes: &[u8]) -> Result<Self, CheckpointError> {
        let mut checkpoint: Checkpoint = serde_json::from_slice(bytes)?;
        checkpoint.id = id.to_string();
        Ok(checkpoint)
    }

    /// Reject the checkpoint if it was taken on a differently shaped graph
    pub fn verify(&self, graph: &Graph) -> Result<(), CheckpointError> {
        if self.graph_signature != graph.signature() {
            return Err(CheckpointError::IncompatibleGraph {
                checkpoint_id: self.id.clone(),
                stored: self.graph_signature.clone(),
                current: graph.signature().to_string(),
            });
        }
        Ok(())
    }

    /// Serialize and store, returning the id the storage assigned
    pub async fn save(&mut self, storage: &dyn CheckpointStorage) -> Result<String, CheckpointError> {
        let id = storage.save(&self.workflow_id, self.encode()?).await?;
        self.id = id.clone();
        Ok(id)
    }

    /// Load and verify against the graph about to resume it
    pub async fn load(
        storage: &dyn CheckpointStorage,
        checkpoint_id: &str,
        graph: &Graph,
    ) -> Result<Self, CheckpointError> {
        let bytes = storage.load(checkpoint_id).await?;
        let checkpoint = Self::decode(checkpoint_id, &bytes)?;
        checkpoint.verify(graph)?;
        Ok(checkpoint)
    }
}

/// Persistence backend for checkpoint bytes
#[async_trait]
pub trait CheckpointStorage: Send + Sync {
    /// Store bytes for a workflow and return a new checkpoint id
    async fn save(&self, workflow_id: &str, data: Vec<u8>) -> Result<String, CheckpointError>;

    async fn load(&self, checkpoint_id: &str) -> Result<Vec<u8>, CheckpointError>;

    /// Checkpoint ids of a workflow, oldest first
    async fn list(&self, workflow_id: &str) -> Result<Vec<String>, CheckpointError>;

    /// Returns whether a checkpoint was removed
    async fn delete(&self, checkpoint_id: &str) -> Result<bool, CheckpointError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::tool::{FnTool, ToolResult};
    use crate::kinetic::workflow::executor::Executor;
    use crate::kinetic::workflow::graph::GraphBuilder;
    use crate::kinetic::workflow::state::StateSchema;
    use serde_json::Value;

    fn graph(extra_edge: bool) -> Graph {
        let node = |id: &str| {
            Executor::function(id, FnTool::new(id, |v: Value, _ctx| async move { ToolResult::Ok(v) }))
        };
        let mut builder = GraphBuilder::new()
            .add_executor(node("a"))
            .add_executor(node("b"))
            .set_start("a")
            .add_edge("a", "b");
        if extra_edge {
            builder = builder.add_edge("b", "a");
        }
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn test_save_then_load_is_identity() {
        let storage = InMemoryCheckpointStorage::new();
        let graph = graph(false);
        let mut state = RunState::new("run-7", &StateSchema::default());
        state.superstep = 2;

        let mut checkpoint = Checkpoint::new("wf", &graph, state.clone());
        let id = checkpoint.save(&storage).await.unwrap();

        let loaded = Checkpoint::load(&storage, &id, &graph).await.unwrap();
        assert_eq!(loaded, checkpoint);
        assert_eq!(loaded.state, state);
    }

    #[tokio::test]
    async fn test_load_rejects_other_graph() {
        let storage = InMemoryCheckpointStorage::new();
        let mut checkpoint = Checkpoint::new(
            "wf",
            &graph(false),
            RunState::new("run", &StateSchema::default()),
        );
        let id = checkpoint.save(&storage).await.unwrap();

        let err = Checkpoint::load(&storage, &id, &graph(true)).await.unwrap_err();
        assert!(matches!(err, CheckpointError::IncompatibleGraph { checkpoint_id, .. } if checkpoint_id == id));
    }
}
