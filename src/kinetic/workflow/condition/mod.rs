// SPDX-License-Identifier: MIT

//! Condition evaluation for conditional edges
//!
//! Conditions are simple expressions over the output being routed:
//! - `output == 'go'`
//! - `confidence > 0.8`
//! - `intent == 'bug' and (priority > 3 or not triaged)`

mod ast;
mod evaluator;
mod parser;

pub use ast::{CompareOp, Comparison, Expression, Literal};
pub use evaluator::{evaluate, resolve_path};
pub use parser::parse;
