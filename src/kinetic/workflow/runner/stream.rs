// SPDX-License-Identifier: MIT

//! Streaming run mode
//!
//! The run is driven on a background task and its events are delivered
//! through an `EventStream` as they happen. Responses sent through a
//! `RunHandle` are queued at once and applied when the run rests in
//! `IDLE_WITH_PENDING_REQUESTS`; the stream ends after the run reaches `IDLE`
//! or `FAILED`, or once every handle is dropped while requests are still
//! pending.

use futures::Stream;
use serde_json::Value;
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use super::run::OpenRequests;
use super::{Workflow, WorkflowRun};
use crate::adk::error::{KineticError, Result};
use crate::kinetic::workflow::event::{RunStatus, WorkflowEvent};

enum RunCommand {
    Respond { request_id: String, response: Value },
}

enum Start {
    Input(Value),
    Resume,
}

/// Control surface of a streaming run
#[derive(Clone)]
pub struct RunHandle {
    commands: mpsc::UnboundedSender<RunCommand>,
    open_requests: OpenRequests,
    cancel: CancellationToken,
}

impl RunHandle {
    /// Answer an outstanding request
    ///
    /// Returns once the answer is queued, without waiting for the run; it is
    /// applied when the run next goes idle. Fails for an id that is not
    /// outstanding or already answered, and once the run has finished.
    pub async fn send_response(&self, request_id: impl Into<String>, response: Value) -> Result<()> {
        let request_id = request_id.into();
        if self.commands.is_closed() {
            return Err(finished());
        }
        let claimed = self
            .open_requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&request_id);
        if !claimed {
            return Err(KineticError::UnknownRequest { request_id });
        }
        self.commands
            .send(RunCommand::Respond {
                request_id,
                response,
            })
            .map_err(|_| finished())
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

fn finished() -> KineticError {
    KineticError::other("workflow run has already finished")
}

/// Events of a run driven in the background
pub struct EventStream {
    inner: ReceiverStream<WorkflowEvent>,
    handle: RunHandle,
}

impl EventStream {
    pub fn handle(&self) -> RunHandle {
        self.handle.clone()
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }
}

impl Stream for EventStream {
    type Item = WorkflowEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Workflow {
    /// Start a run in the background and stream its events
    pub fn run_stream(&self, input: Value) -> EventStream {
        spawn_driver(self.start(), self.config().event_buffer, Start::Input(input))
    }

    /// Restore a run from a checkpoint and stream the rest of it
    pub async fn resume_stream(&self, checkpoint_id: &str) -> Result<EventStream> {
        let run = self.restore(checkpoint_id).await?;
        Ok(spawn_driver(run, self.config().event_buffer, Start::Resume))
    }
}

fn spawn_driver(run: WorkflowRun, buffer: usize, start: Start) -> EventStream {
    let (events_tx, events_rx) = mpsc::channel(buffer.max(1));
    let (commands_tx, mut commands_rx) = mpsc::unbounded_channel();
    let cancel = run.cancellation_token();
    let open_requests: OpenRequests = Arc::new(Mutex::new(HashSet::new()));
    let mut run = run
        .with_sink(events_tx)
        .with_open_requests(open_requests.clone());

    let token = cancel.clone();
    tokio::spawn(async move {
        let started = match start {
            Start::Input(input) => run.run(input).await,
            Start::Resume => run.resume().await,
        };
        if let Err(e) = started {
            log::error!("Streaming run {} could not start: {}", run.run_id(), e);
            return;
        }

        while run.status() == RunStatus::IdleWithPendingRequests {
            tokio::select! {
                _ = token.cancelled() => run.drive().await,
                command = commands_rx.recv() => match command {
                    Some(RunCommand::Respond { request_id, response }) => {
                        match run.handle_response(&request_id, response).await {
                            Ok(()) => run.drive().await,
                            Err(e) => log::warn!("Response to {} was not applied: {}", request_id, e),
                        }
                    }
                    None => {
                        log::debug!("All handles for run {} dropped while waiting", run.run_id());
                        break;
                    }
                },
            }
        }
    });

    EventStream {
        inner: ReceiverStream::new(events_rx),
        handle: RunHandle {
            commands: commands_tx,
            open_requests,
            cancel,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::tool::{FnTool, ToolResult};
    use crate::kinetic::workflow::checkpoint::InMemoryCheckpointStorage;
    use crate::kinetic::workflow::config::RunnerConfig;
    use crate::kinetic::workflow::executor::Executor;
    use crate::kinetic::workflow::graph::GraphBuilder;
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn passthrough(id: &str) -> Executor {
        Executor::function(
            id,
            FnTool::new(id, |input: Value, _ctx| async move { ToolResult::Ok(input) }),
        )
    }

    #[tokio::test]
    async fn test_stream_ends_with_terminal_event() {
        let graph = GraphBuilder::new()
            .add_executor(Executor::function(
                "echo",
                FnTool::new("echo", |input: Value, _ctx| async move { ToolResult::Ok(input) }),
            ))
            .set_start("echo")
            .build()
            .unwrap();
        let events: Vec<WorkflowEvent> = Workflow::new("s", graph).run_stream(json!(1)).collect().await;

        assert!(matches!(events.first(), Some(WorkflowEvent::WorkflowStarted { .. })));
        assert_eq!(
            events.last(),
            Some(&WorkflowEvent::WorkflowStatus {
                state: RunStatus::Idle
            })
        );
        assert!(events.contains(&WorkflowEvent::WorkflowOutput {
            executor_id: "echo".into(),
            data: json!(1)
        }));
    }

    #[tokio::test]
    async fn test_respond_mid_stream() {
        let graph = GraphBuilder::new()
            .add_executor(Executor::request_info("approve", None))
            .set_start("approve")
            .build()
            .unwrap();
        let mut stream = Workflow::new("hitl", graph).run_stream(json!("deploy?"));
        let handle = stream.handle();

        let mut seen = Vec::new();
        while let Some(event) = stream.next().await {
            if let WorkflowEvent::RequestInfo { request_id, .. } = &event {
                handle.send_response(request_id.clone(), json!("approved")).await.unwrap();
            }
            seen.push(event);
        }

        assert!(seen.contains(&WorkflowEvent::WorkflowStatus {
            state: RunStatus::IdleWithPendingRequests
        }));
        assert!(seen.contains(&WorkflowEvent::WorkflowOutput {
            executor_id: "approve".into(),
            data: json!("approved")
        }));
        assert_eq!(
            seen.last(),
            Some(&WorkflowEvent::WorkflowStatus {
                state: RunStatus::Idle
            })
        );
        assert!(handle.send_response("late", json!(null)).await.is_err());
    }

    #[tokio::test]
    async fn test_resume_stream_answers_restored_request() {
        let graph = GraphBuilder::new()
            .add_executor(Executor::request_info("approve", None))
            .set_start("approve")
            .build()
            .unwrap();
        let workflow = Workflow::new("hitl", graph)
            .with_checkpoint_storage(Arc::new(InMemoryCheckpointStorage::new()));
        let run = workflow.run(json!("deploy?")).await.unwrap();
        let request_id = run.pending_requests()[0].request_id.clone();
        let checkpoint = run.last_checkpoint_id().unwrap().to_string();
        drop(run);

        let stream = workflow.resume_stream(&checkpoint).await.unwrap();
        stream
            .handle()
            .send_response(request_id, json!("approved"))
            .await
            .unwrap();
        let events: Vec<WorkflowEvent> = stream.collect().await;

        assert!(events.contains(&WorkflowEvent::WorkflowOutput {
            executor_id: "approve".into(),
            data: json!("approved")
        }));
        assert_eq!(
            events.last(),
            Some(&WorkflowEvent::WorkflowStatus {
                state: RunStatus::Idle
            })
        );
    }

    #[tokio::test]
    async fn test_respond_while_parallel_branch_fills_event_buffer() {
        let chain: Vec<String> = (1..=10).map(|i| format!("s{}", i)).collect();
        let mut builder = GraphBuilder::new()
            .add_executor(passthrough("a"))
            .add_executor(Executor::request_info("approve", None));
        for id in &chain {
            builder = builder.add_executor(passthrough(id));
        }
        builder = builder.add_fan_out("a", ["approve", "s1"]);
        for pair in chain.windows(2) {
            builder = builder.add_edge(pair[0].as_str(), pair[1].as_str());
        }
        let graph = builder.set_start("a").build().unwrap();
        let workflow = Workflow::new("busy", graph).with_config(RunnerConfig {
            event_buffer: 8,
            ..RunnerConfig::default()
        });

        let mut stream = workflow.run_stream(json!("go"));
        let handle = stream.handle();
        let consume = async {
            let mut seen = Vec::new();
            while let Some(event) = stream.next().await {
                if let WorkflowEvent::RequestInfo { request_id, .. } = &event {
                    handle.send_response(request_id.clone(), json!("approved")).await.unwrap();
                    assert!(matches!(
                        handle.send_response(request_id.clone(), json!("again")).await,
                        Err(KineticError::UnknownRequest { .. })
                    ));
                }
                seen.push(event);
            }
            seen
        };
        let seen = tokio::time::timeout(Duration::from_secs(5), consume)
            .await
            .expect("run stalled while a response was outstanding");

        assert!(seen.contains(&WorkflowEvent::WorkflowOutput {
            executor_id: "approve".into(),
            data: json!("approved")
        }));
        assert!(seen.contains(&WorkflowEvent::WorkflowOutput {
            executor_id: "s10".into(),
            data: json!("go")
        }));
        assert_eq!(
            seen.last(),
            Some(&WorkflowEvent::WorkflowStatus {
                state: RunStatus::Idle
            })
        );
    }
}
