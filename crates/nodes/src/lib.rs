//! LLM batch node implementations.
//!
//! Each node here implements [`pipeline::BatchNode`] by building a prompt for
//! one row and calling an injected [`pipeline::LlmProvider`]. Validation,
//! fan-out, reassembly and publishing all come from
//! [`pipeline::execute_rows`]; nodes only supply the per-row unit of work.
//!
//! | Node | Inputs | Outputs |
//! |------|--------|---------|
//! | [`ChatNode`] | `user` (+ `assistant` when the prior turn is included) | `message` |
//! | [`GenerateNode`] | `prompt` | `response` |
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Nodes sequence calls between the batch contract in
//! the [`pipeline`] crate and the provider port. They contain no transport
//! details of their own.

pub mod chat;
pub mod generate;

mod fields;

pub use chat::{ChatNode, ChatNodeBuilder, ChatNodeConfig};
pub use generate::{GenerateNode, GenerateNodeBuilder, GenerateNodeConfig};
