// SPDX-License-Identifier: MIT

//! Superstep execution of a single run

use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::state::{Message, PendingRequest, RunState};
use super::Workflow;
use crate::adk::error::{
    ExecutorInvocationError, FailureKind, KineticError, Result, RunFailure,
};
use crate::kinetic::workflow::checkpoint::Checkpoint;
use crate::kinetic::workflow::event::{RunStatus, WorkflowEvent};
use crate::kinetic::workflow::executor::{Executor, ExecutorContext, Invocation};
use crate::kinetic::workflow::graph::{Delivery, Edge};
use crate::kinetic::workflow::state::StateScope;

type InvocationResult = std::result::Result<Invocation, ExecutorInvocationError>;

/// Ids of requests that can still be answered, shared with stream handles
pub(crate) type OpenRequests = Arc<Mutex<HashSet<String>>>;

/// One in-flight invocation of a superstep
struct Pending {
    executor: Arc<Executor>,
    ctx: ExecutorContext,
    handle: JoinHandle<InvocationResult>,
}

/// A single execution of a workflow
///
/// Owns the `RunState` and the event log. In streaming mode events are sent
/// to the stream instead of being kept.
pub struct WorkflowRun {
    workflow: Workflow,
    state: RunState,
    events: Vec<WorkflowEvent>,
    outputs: Vec<Value>,
    failure: Option<RunFailure>,
    sink: Option<mpsc::Sender<WorkflowEvent>>,
    open_requests: Option<OpenRequests>,
    cancel: CancellationToken,
    started: bool,
    last_checkpoint: Option<String>,
}

impl WorkflowRun {
    pub(crate) fn new(workflow: Workflow, state: RunState, started: bool) -> Self {
        Self {
            workflow,
            state,
            events: Vec::new(),
            outputs: Vec::new(),
            failure: None,
            sink: None,
            open_requests: None,
            cancel: CancellationToken::new(),
            started,
            last_checkpoint: None,
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub(crate) fn with_sink(mut self, sink: mpsc::Sender<WorkflowEvent>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Publish request ids as they are raised, seeded with the outstanding ones
    pub(crate) fn with_open_requests(mut self, open: OpenRequests) -> Self {
        open.lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(self.state.outstanding_requests.keys().cloned());
        self.open_requests = Some(open);
        self
    }

    pub(crate) fn set_last_checkpoint(&mut self, id: String) {
        self.last_checkpoint = Some(id);
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn run_id(&self) -> &str {
        &self.state.run_id
    }

    pub fn status(&self) -> RunStatus {
        self.state.status
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Events emitted so far (empty in streaming mode)
    pub fn events(&self) -> &[WorkflowEvent] {
        &self.events
    }

    /// Outputs surfaced to the caller, in emission order
    pub fn outputs(&self) -> &[Value] {
        &self.outputs
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        self.failure.as_ref()
    }

    pub fn pending_requests(&self) -> Vec<&PendingRequest> {
        self.state.outstanding_requests.values().collect()
    }

    pub fn last_checkpoint_id(&self) -> Option<&str> {
        self.last_checkpoint.as_deref()
    }

    /// Request cooperative cancellation
    ///
    /// In-flight invocations are abandoned and the run fails with a
    /// cancellation error the next time it is driven.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Seed the entry executor with the input and drive to a terminal status
    pub async fn run(&mut self, input: Value) -> Result<()> {
        if self.started {
            return Err(KineticError::invalid_state("start", self.state.status));
        }
        self.started = true;

        let entry = self.workflow.graph().entry().to_string();
        log::info!(
            "Starting workflow '{}' run {} at '{}'",
            self.workflow.id(),
            self.state.run_id,
            entry
        );
        self.emit(WorkflowEvent::WorkflowStarted {
            workflow_id: self.workflow.id().to_string(),
            run_id: self.state.run_id.clone(),
        })
        .await;
        self.emit(WorkflowEvent::WorkflowStatus {
            state: RunStatus::InProgress,
        })
        .await;

        self.state.enqueue(Message {
            payload: input,
            origins: Vec::new(),
            target: entry,
            superstep: 0,
        });
        self.drive().await;
        Ok(())
    }

    /// Continue a restored run from its current superstep
    pub async fn resume(&mut self) -> Result<()> {
        if !self.started || self.state.status == RunStatus::Failed {
            return Err(KineticError::invalid_state("resume", self.state.status));
        }
        if self.state.has_pending_messages() {
            let next = self.in_progress_status();
            self.set_status(next, false).await;
        }
        self.drive().await;
        Ok(())
    }

    /// Answer an outstanding request without advancing the run
    ///
    /// The response is routed as the output of the request-info executor
    /// that asked for it.
    pub async fn handle_response(&mut self, request_id: &str, response: Value) -> Result<()> {
        if !self.started || self.state.status == RunStatus::Failed {
            return Err(KineticError::invalid_state("accept a response", self.state.status));
        }
        let request = self
            .state
            .outstanding_requests
            .remove(request_id)
            .ok_or_else(|| KineticError::UnknownRequest {
                request_id: request_id.to_string(),
            })?;

        log::info!(
            "Received response for request {} from '{}'",
            request_id,
            request.executor_id
        );
        let superstep = self.state.superstep;
        self.deliver(&request.executor_id, response, superstep).await;

        let next = self.in_progress_status();
        self.set_status(next, false).await;

        if self.checkpointing_enabled() {
            if let Err(err) = self.checkpoint().await {
                self.fail(RunFailure {
                    kind: FailureKind::Checkpoint,
                    executor_id: None,
                    message: err.to_string(),
                })
                .await;
            }
        }
        Ok(())
    }

    /// Answer an outstanding request and drive the run to its next terminal status
    pub async fn send_response(&mut self, request_id: &str, response: Value) -> Result<()> {
        self.handle_response(request_id, response).await?;
        self.drive().await;
        Ok(())
    }

    /// Save the current state to the attached checkpoint storage
    pub async fn checkpoint(&mut self) -> Result<String> {
        let storage = self.workflow.checkpoint_storage().cloned().ok_or_else(|| {
            KineticError::config(format!(
                "workflow '{}' has no checkpoint storage attached",
                self.workflow.id()
            ))
        })?;
        let mut checkpoint =
            Checkpoint::new(self.workflow.id(), self.workflow.graph(), self.state.clone());
        let id = checkpoint.save(storage.as_ref()).await?;
        log::debug!(
            "Checkpoint {} saved at superstep {}",
            id,
            self.state.superstep
        );
        self.last_checkpoint = Some(id.clone());
        Ok(id)
    }

    /// Execute supersteps until the run is idle or failed
    pub(crate) async fn drive(&mut self) {
        loop {
            if self.state.status == RunStatus::Failed {
                return;
            }
            if self.cancel.is_cancelled() {
                log::warn!("Run {} cancelled", self.state.run_id);
                self.fail(RunFailure::cancelled()).await;
                return;
            }

            if !self.state.has_pending_messages() {
                let status = if self.state.has_outstanding_requests() {
                    RunStatus::IdleWithPendingRequests
                } else {
                    RunStatus::Idle
                };
                log::info!(
                    "Run {} is {} after {} supersteps",
                    self.state.run_id,
                    status,
                    self.state.superstep
                );
                self.set_status(status, true).await;
                return;
            }

            let limit = self.workflow.config().max_supersteps;
            if self.state.superstep >= limit {
                log::error!("Run {} exceeded {} supersteps", self.state.run_id, limit);
                self.fail(RunFailure::from(&KineticError::SuperstepLimit { limit }))
                    .await;
                return;
            }

            self.run_superstep().await;
            if self.state.status == RunStatus::Failed {
                return;
            }

            if self.checkpointing_enabled() {
                if let Err(err) = self.checkpoint().await {
                    log::error!("Failed to save checkpoint: {}", err);
                    self.fail(RunFailure {
                        kind: FailureKind::Checkpoint,
                        executor_id: None,
                        message: err.to_string(),
                    })
                    .await;
                    return;
                }
            }
        }
    }

    async fn run_superstep(&mut self) {
        let graph = self.workflow.graph().clone();
        let superstep = self.state.superstep + 1;
        let ready = self.state.take_ready(graph.executor_ids());

        log::info!(
            "Superstep {}: executing {} invocation(s): {:?}",
            superstep,
            ready.len(),
            ready.iter().map(|m| m.target.as_str()).collect::<Vec<_>>()
        );
        self.emit(WorkflowEvent::SuperstepStarted { superstep }).await;

        let snapshot = Arc::new(self.state.shared_state.clone());
        let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();
        let mut pending = Vec::with_capacity(ready.len());

        for message in ready {
            let Some(executor) = graph.executor(&message.target).cloned() else {
                log::warn!("Dropping message for unknown executor '{}'", message.target);
                continue;
            };
            self.emit(WorkflowEvent::ExecutorInvoked {
                executor_id: executor.id().to_string(),
                superstep,
            })
            .await;

            let ctx = ExecutorContext::new(
                executor.id(),
                self.state.run_id.clone(),
                superstep,
                StateScope::new(snapshot.clone(), graph.state_schema().clone()),
                self.cancel.clone(),
            );
            let task_executor = executor.clone();
            let task_ctx = ctx.clone();
            let token = self.cancel.clone();
            let updates = updates_tx.clone();
            let handle = tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => Err(ExecutorInvocationError::new(
                        task_executor.id(),
                        "cancelled before completion",
                    )),
                    result = task_executor.invoke(message.payload, task_ctx, updates) => result,
                }
            });
            pending.push(Pending {
                executor,
                ctx,
                handle,
            });
        }
        drop(updates_tx);

        // Forward agent updates while the invocations run
        let (invocations, handles): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .map(|p| ((p.executor, p.ctx), p.handle))
            .unzip();
        let joined = futures::future::join_all(handles);
        tokio::pin!(joined);
        let results = loop {
            tokio::select! {
                Some((executor_id, update)) = updates_rx.recv() => {
                    self.emit(WorkflowEvent::AgentRunUpdate { executor_id, update }).await;
                }
                results = &mut joined => break results,
            }
        };
        while let Ok((executor_id, update)) = updates_rx.try_recv() {
            self.emit(WorkflowEvent::AgentRunUpdate { executor_id, update })
                .await;
        }

        let mut failure: Option<RunFailure> = None;
        let mut writes = Vec::new();
        for ((executor, ctx), outcome) in invocations.into_iter().zip(results) {
            let id = executor.id().to_string();
            let result = outcome.unwrap_or_else(|e| {
                Err(ExecutorInvocationError::new(&id, format!("task failed: {}", e)))
            });

            match result {
                Ok(invocation) => {
                    match &invocation {
                        Invocation::Output(response) if executor.is_agent() => {
                            self.emit(WorkflowEvent::AgentRun {
                                executor_id: id.clone(),
                                response: response.clone(),
                            })
                            .await;
                        }
                        _ => {}
                    }
                    for value in ctx.take_outputs() {
                        self.surface_output(&id, value).await;
                    }
                    writes.extend(ctx.take_writes());

                    match invocation {
                        Invocation::Output(output) => self.deliver(&id, output, superstep).await,
                        Invocation::Request(payload) => {
                            self.record_request(&id, payload, superstep).await
                        }
                    }

                    log::info!("Executor {} completed", id);
                    self.emit(WorkflowEvent::ExecutorCompleted {
                        executor_id: id,
                        superstep,
                    })
                    .await;
                }
                Err(err) => {
                    log::error!("Executor {} failed: {}", id, err.message);
                    self.emit(WorkflowEvent::ExecutorFailed {
                        executor_id: id,
                        error: err.message.clone(),
                    })
                    .await;
                    if failure.is_none() {
                        failure = Some(if self.cancel.is_cancelled() {
                            RunFailure::cancelled()
                        } else {
                            RunFailure::from(&err)
                        });
                    }
                }
            }
        }

        // Writes land in invocation order, so the last writer of a key wins
        let schema = graph.state_schema().clone();
        for (key, value) in writes {
            self.state.shared_state.apply(&schema, &key, value);
        }

        self.state.superstep = superstep;
        self.emit(WorkflowEvent::SuperstepCompleted { superstep }).await;

        match failure {
            Some(failure) => self.fail(failure).await,
            None => {
                let next = self.in_progress_status();
                self.set_status(next, false).await;
            }
        }
    }

    /// Surface designated outputs and route an executor's output
    async fn deliver(&mut self, from: &str, output: Value, superstep: u32) {
        let graph = self.workflow.graph().clone();
        if graph.is_output(from) {
            self.surface_output(from, output.clone()).await;
        }

        for delivery in graph.route(from, &output) {
            log::debug!("Routing output of '{}' to '{}'", from, delivery.target());
            match delivery {
                Delivery::Message { target, payload } => self.state.enqueue(Message {
                    payload,
                    origins: vec![from.to_string()],
                    target,
                    superstep,
                }),
                Delivery::FanInPart {
                    edge,
                    from,
                    target,
                    payload,
                } => {
                    let Some(Edge::FanIn { sources, .. }) = graph.edges().get(edge) else {
                        continue;
                    };
                    match self.state.buffer_fan_in(edge, sources, &from, payload) {
                        Some(joined) => {
                            let arity = graph.input_arity(&target);
                            debug_assert!(sources.len() <= arity);
                            log::debug!(
                                "Fan-in into '{}' complete with {} sources (input arity {})",
                                target,
                                sources.len(),
                                arity
                            );
                            self.state.enqueue(Message {
                                payload: joined,
                                origins: sources.clone(),
                                target,
                                superstep,
                            });
                        }
                        None => log::debug!(
                            "Fan-in into '{}' waiting, arrived so far: {:?}",
                            target,
                            self.state
                                .fan_in
                                .get(&edge)
                                .map(|buffer| buffer.arrived())
                                .unwrap_or_default()
                        ),
                    }
                }
            }
        }
    }

    async fn record_request(&mut self, executor_id: &str, payload: Value, superstep: u32) {
        let request_id = Uuid::new_v4().to_string();
        log::info!("Executor {} requested input ({})", executor_id, request_id);
        self.state.outstanding_requests.insert(
            request_id.clone(),
            PendingRequest {
                request_id: request_id.clone(),
                executor_id: executor_id.to_string(),
                payload: payload.clone(),
                superstep,
            },
        );
        // Answerable before anyone can observe the event
        if let Some(open) = &self.open_requests {
            open.lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(request_id.clone());
        }
        self.emit(WorkflowEvent::RequestInfo {
            request_id,
            executor_id: executor_id.to_string(),
            data: payload,
        })
        .await;
    }

    async fn surface_output(&mut self, executor_id: &str, data: Value) {
        self.outputs.push(data.clone());
        self.emit(WorkflowEvent::WorkflowOutput {
            executor_id: executor_id.to_string(),
            data,
        })
        .await;
    }

    fn in_progress_status(&self) -> RunStatus {
        if self.state.has_outstanding_requests() {
            RunStatus::InProgressPendingRequests
        } else {
            RunStatus::InProgress
        }
    }

    fn checkpointing_enabled(&self) -> bool {
        self.workflow.checkpoint_storage().is_some()
            && self.workflow.config().checkpoint_every_superstep
    }

    async fn set_status(&mut self, status: RunStatus, force: bool) {
        if force || self.state.status != status {
            self.state.status = status;
            self.emit(WorkflowEvent::WorkflowStatus { state: status })
                .await;
        }
    }

    async fn fail(&mut self, failure: RunFailure) {
        log::error!("Run {} failed: {}", self.state.run_id, failure.message);
        self.set_status(RunStatus::Failed, true).await;
        self.failure = Some(failure.clone());
        self.emit(WorkflowEvent::WorkflowFailed { error: failure })
            .await;
    }

    async fn emit(&mut self, event: WorkflowEvent) {
        match &self.sink {
            Some(sink) => {
                if sink.send(event).await.is_err() {
                    log::debug!("Event stream for run {} was dropped", self.state.run_id);
                }
            }
            None => self.events.push(event),
        }
    }
}
