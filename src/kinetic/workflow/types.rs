// SPDX-License-Identifier: MIT

//! YAML schema types for workflow definitions
//!
//! This module contains the data structures parsed from workflow files.
//! A file describes either a graph directly (`kind: Graph`) or one of the
//! patterns `Sequential` and `Concurrent`, which the normalizer rewrites
//! into a graph.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::kinetic::workflow::config::RunnerConfig;
use crate::kinetic::workflow::state::StateSchema;

fn default_kind() -> String {
    "Graph".to_string()
}

/// Top-level workflow definition
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Workflow kind: "Graph", "Sequential" or "Concurrent"
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Entry executor (Graph workflows)
    pub start: Option<String>,
    #[serde(default)]
    pub executors: Vec<ExecutorDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
    /// Steps of a Sequential or Concurrent workflow
    #[serde(default)]
    pub steps: Vec<ExecutorDefinition>,
    /// Executor that receives the collected results of a Concurrent workflow
    pub aggregator: Option<ExecutorDefinition>,
    /// Executors whose outputs are surfaced; sinks when omitted
    pub outputs: Option<Vec<String>>,
    #[serde(default)]
    pub state: StateSchema,
    #[serde(default)]
    pub config: RunnerConfig,
}

/// A graph node
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExecutorDefinition {
    pub id: String,
    /// "function", "agent", "workflow", "request_info" or "passthrough"
    pub kind: String,
    /// Registered tool name (function executors)
    pub tool: Option<String>,
    /// Registered agent name (agent executors)
    pub agent: Option<String>,
    /// Nested workflow file, relative to the file declaring it
    pub file: Option<String>,
    /// Prompt attached to requests (request_info executors)
    pub prompt: Option<String>,
}

impl ExecutorDefinition {
    pub fn passthrough(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: "passthrough".to_string(),
            tool: None,
            agent: None,
            file: None,
            prompt: None,
        }
    }
}

/// An edge between executors
///
/// The shape of `from` and `to` selects the edge kind: one to one is direct
/// (conditional with `when`), one to many fans out, many to one fans in.
/// An edge with `switch` routes on the selected value through `cases`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EdgeDefinition {
    pub from: Endpoints,
    pub to: Option<Endpoints>,
    pub when: Option<String>,
    pub switch: Option<String>,
    #[serde(default)]
    pub cases: BTreeMap<String, String>,
    pub default: Option<String>,
}

impl EdgeDefinition {
    pub fn direct(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: Endpoints::One(from.into()),
            to: Some(Endpoints::One(to.into())),
            when: None,
            switch: None,
            cases: BTreeMap::new(),
            default: None,
        }
    }

    pub fn fan_out(from: impl Into<String>, targets: Vec<String>) -> Self {
        Self {
            to: Some(Endpoints::Many(targets)),
            ..Self::direct(from, "")
        }
    }

    pub fn fan_in(sources: Vec<String>, to: impl Into<String>) -> Self {
        Self {
            from: Endpoints::Many(sources),
            ..Self::direct("", to)
        }
    }
}

/// One executor id or a list of them
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Endpoints {
    One(String),
    Many(Vec<String>),
}

impl Endpoints {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Endpoints::One(s) => vec![s.clone()],
            Endpoints::Many(v) => v.clone(),
        }
    }
}
