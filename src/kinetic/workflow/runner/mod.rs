// SPDX-License-Identifier: MIT

//! Superstep runner
//!
//! A `Workflow` pairs an immutable graph with runner configuration and an
//! optional checkpoint storage. Each call to `start` creates an independent
//! `WorkflowRun` that owns its `RunState`; concurrent runs share only the
//! graph.

mod run;
mod state;
mod stream;

pub use run::WorkflowRun;
pub use state::{FanInBuffer, Message, PendingRequest, RunState};
pub use stream::{EventStream, RunHandle};

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::adk::error::Result;
use crate::kinetic::workflow::checkpoint::{Checkpoint, CheckpointStorage};
use crate::kinetic::workflow::config::RunnerConfig;
use crate::kinetic::workflow::graph::Graph;

/// A runnable workflow
#[derive(Clone)]
pub struct Workflow {
    id: String,
    graph: Arc<Graph>,
    config: RunnerConfig,
    checkpoints: Option<Arc<dyn CheckpointStorage>>,
}

impl Workflow {
    pub fn new(id: impl Into<String>, graph: Graph) -> Self {
        Self {
            id: id.into(),
            graph: Arc::new(graph),
            config: RunnerConfig::default(),
            checkpoints: None,
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_checkpoint_storage(mut self, storage: Arc<dyn CheckpointStorage>) -> Self {
        self.checkpoints = Some(storage);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn checkpoint_storage(&self) -> Option<&Arc<dyn CheckpointStorage>> {
        self.checkpoints.as_ref()
    }

    /// Create a fresh run that has not received input yet
    pub fn start(&self) -> WorkflowRun {
        let state = RunState::new(Uuid::new_v4().to_string(), self.graph.state_schema());
        WorkflowRun::new(self.clone(), state, false)
    }

    /// Run to a terminal status and return the run with its events and outputs
    pub async fn run(&self, input: Value) -> Result<WorkflowRun> {
        let mut run = self.start();
        run.run(input).await?;
        Ok(run)
    }

    /// Rebuild a run from a checkpoint without advancing it
    ///
    /// Fails with `IncompatibleGraph` when the checkpoint was taken on a
    /// graph with a different signature.
    pub async fn restore(&self, checkpoint_id: &str) -> Result<WorkflowRun> {
        let storage = self.require_storage()?;
        let checkpoint = Checkpoint::load(storage.as_ref(), checkpoint_id, &self.graph).await?;
        log::info!(
            "Restored run {} of workflow '{}' at superstep {} from checkpoint {}",
            checkpoint.state.run_id,
            self.id,
            checkpoint.state.superstep,
            checkpoint_id
        );
        let mut run = WorkflowRun::new(self.clone(), checkpoint.state, true);
        run.set_last_checkpoint(checkpoint.id);
        Ok(run)
    }

    /// Restore from a checkpoint and continue executing supersteps
    pub async fn resume(&self, checkpoint_id: &str) -> Result<WorkflowRun> {
        let mut run = self.restore(checkpoint_id).await?;
        run.resume().await?;
        Ok(run)
    }

    pub async fn list_checkpoints(&self) -> Result<Vec<String>> {
        Ok(self.require_storage()?.list(&self.id).await?)
    }

    fn require_storage(&self) -> Result<&Arc<dyn CheckpointStorage>> {
        self.checkpoints.as_ref().ok_or_else(|| {
            crate::adk::error::KineticError::config(format!(
                "workflow '{}' has no checkpoint storage attached",
                self.id
            ))
        })
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.id)
            .field("graph", &self.graph)
            .field("config", &self.config)
            .field("checkpoints", &self.checkpoints.is_some())
            .finish()
    }
}
