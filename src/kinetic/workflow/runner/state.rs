// SPDX-License-Identifier: MIT

//! Serializable state of one workflow run

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};

use crate::kinetic::workflow::event::RunStatus;
use crate::kinetic::workflow::state::{SharedState, StateSchema};

/// A payload travelling between executors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub payload: Value,
    /// Producing executors: none for the caller's input, every source of the
    /// wave for a joined fan-in
    #[serde(default)]
    pub origins: Vec<String>,
    pub target: String,
    /// Superstep that produced the message, 0 for the input
    pub superstep: u32,
}

/// A request waiting for an external response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub request_id: String,
    pub executor_id: String,
    pub payload: Value,
    pub superstep: u32,
}

/// Partial arrivals on one fan-in edge, keyed by source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FanInBuffer {
    arrivals: BTreeMap<String, VecDeque<Value>>,
}

impl FanInBuffer {
    pub fn push(&mut self, from: &str, payload: Value) {
        self.arrivals
            .entry(from.to_string())
            .or_default()
            .push_back(payload);
    }

    /// Take one arrival from every source once all of them have delivered
    ///
    /// The payloads come back in the order the sources are listed.
    pub fn take_wave(&mut self, sources: &[String]) -> Option<Vec<Value>> {
        let complete = sources
            .iter()
            .all(|s| self.arrivals.get(s).is_some_and(|q| !q.is_empty()));
        if !complete {
            return None;
        }

        let mut wave = Vec::with_capacity(sources.len());
        for source in sources {
            if let Some(value) = self.arrivals.get_mut(source).and_then(VecDeque::pop_front) {
                wave.push(value);
            }
        }
        self.arrivals.retain(|_, q| !q.is_empty());
        Some(wave)
    }

    /// Sources that have delivered for the current wave
    pub fn arrived(&self) -> Vec<&str> {
        self.arrivals.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.arrivals.is_empty()
    }
}

/// Everything needed to continue a run from where it stopped
///
/// The event log is not part of the state; it belongs to the run handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub status: RunStatus,
    /// Number of completed supersteps
    pub superstep: u32,
    pub inboxes: BTreeMap<String, VecDeque<Message>>,
    pub fan_in: BTreeMap<usize, FanInBuffer>,
    pub shared_state: SharedState,
    pub outstanding_requests: BTreeMap<String, PendingRequest>,
}

impl RunState {
    pub fn new(run_id: impl Into<String>, schema: &StateSchema) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::InProgress,
            superstep: 0,
            inboxes: BTreeMap::new(),
            fan_in: BTreeMap::new(),
            shared_state: SharedState::new(schema),
            outstanding_requests: BTreeMap::new(),
        }
    }

    pub fn enqueue(&mut self, message: Message) {
        self.inboxes
            .entry(message.target.clone())
            .or_default()
            .push_back(message);
    }

    pub fn has_pending_messages(&self) -> bool {
        self.inboxes.values().any(|inbox| !inbox.is_empty())
    }

    pub fn has_outstanding_requests(&self) -> bool {
        !self.outstanding_requests.is_empty()
    }

    /// Drain every inbox, visiting executors in the given order
    pub fn take_ready(&mut self, order: &[String]) -> Vec<Message> {
        let mut ready = Vec::new();
        for id in order {
            if let Some(inbox) = self.inboxes.remove(id) {
                ready.extend(inbox);
            }
        }
        ready
    }

    /// Buffer a fan-in part; returns the joined payload when the wave completes
    pub fn buffer_fan_in(
        &mut self,
        edge: usize,
        sources: &[String],
        from: &str,
        payload: Value,
    ) -> Option<Value> {
        let buffer = self.fan_in.entry(edge).or_default();
        buffer.push(from, payload);
        let wave = buffer.take_wave(sources)?;
        if buffer.is_empty() {
            self.fan_in.remove(&edge);
        }
        Some(Value::Array(wave))
    }
}
