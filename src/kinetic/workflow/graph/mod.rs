// SPDX-License-Identifier: MIT

//! Executor graph
//!
//! This module provides the immutable `Graph`, the `GraphBuilder` that
//! validates it, the edge kinds and the router that decides where an
//! executor's output is delivered.

mod definition;
mod edge;
mod router;

pub use definition::{Graph, GraphBuilder};
pub use edge::{Condition, Edge, Selector};
pub use router::Delivery;
