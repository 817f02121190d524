// SPDX-License-Identifier: MIT

//! State management for graph workflows
//!
//! This module provides:
//! - `StateSchema` - declares fields, types, defaults and reducers
//! - `SharedState` - the run's key-value state, committed once per superstep
//! - `StateScope` - an invocation's buffered view of the shared state

mod schema;
mod store;

pub use schema::{reduce, FieldType, ReducerType, StateFieldDef, StateSchema};
pub use store::{SharedState, StateScope};
