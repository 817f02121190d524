// SPDX-License-Identifier: MIT

//! Workflow engine
//!
//! Graphs of executors connected by edges run as a sequence of supersteps.
//! Graphs are assembled in code with `GraphBuilder` or compiled from YAML
//! files by `Builder`.

pub mod builder;
pub mod checkpoint;
pub mod condition;
pub mod config;
pub mod event;
pub mod executor;
pub mod graph;
pub mod loader;
pub mod normalizer;
pub mod registry;
pub mod runner;
pub mod state;
pub mod types;

pub use config::RunnerConfig;
pub use event::{RunStatus, WorkflowEvent};
pub use executor::{Executor, ExecutorContext, ExecutorKind};
pub use graph::{Condition, Edge, Graph, GraphBuilder, Selector};
pub use runner::{EventStream, RunHandle, Workflow, WorkflowRun};
