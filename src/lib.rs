// SPDX-License-Identifier: MIT

//! Graph-based workflow orchestration
//!
//! `adk` holds the collaborator contracts (agents, tools, errors) and
//! `kinetic` the workflow engine with its declarative layer and built-in
//! tools.

pub mod adk;
pub mod kinetic;
