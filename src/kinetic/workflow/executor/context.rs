// SPDX-License-Identifier: MIT

//! Per-invocation context handed to executors and tools

use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::kinetic::workflow::state::StateScope;

/// What an executor may touch while it runs
///
/// Cloning is cheap; clones share the same buffered writes, yielded outputs
/// and cancellation signal.
#[derive(Debug, Clone)]
pub struct ExecutorContext {
    executor_id: String,
    run_id: String,
    superstep: u32,
    state: StateScope,
    yielded: Arc<Mutex<Vec<Value>>>,
    cancel: CancellationToken,
}

impl ExecutorContext {
    pub fn new(
        executor_id: impl Into<String>,
        run_id: impl Into<String>,
        superstep: u32,
        state: StateScope,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            executor_id: executor_id.into(),
            run_id: run_id.into(),
            superstep,
            state,
            yielded: Arc::new(Mutex::new(Vec::new())),
            cancel,
        }
    }

    /// Context outside of any run, with empty state
    pub fn detached(executor_id: impl Into<String>) -> Self {
        Self::new(
            executor_id,
            "detached",
            0,
            StateScope::empty(),
            CancellationToken::new(),
        )
    }

    pub fn executor_id(&self) -> &str {
        &self.executor_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn superstep(&self) -> u32 {
        self.superstep
    }

    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.state.get(key)
    }

    /// Buffer a shared state write, committed after the superstep
    ///
    /// Returns false when the field's declared type rejects the value.
    pub fn set_state(&self, key: impl Into<String>, value: Value) -> bool {
        self.state.set(key, value)
    }

    /// Surface a value to the caller as a workflow output
    pub fn yield_output(&self, value: Value) {
        self.yielded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(value);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the run is cancelled
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn take_outputs(&self) -> Vec<Value> {
        std::mem::take(&mut *self.yielded.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub(crate) fn take_writes(&self) -> Vec<(String, Value)> {
        self.state.take_writes()
    }
}
