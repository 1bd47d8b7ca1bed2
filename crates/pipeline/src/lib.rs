//! Core batch-execution contract for LLM pipeline nodes.
//!
//! This crate defines how a node declares its input fields, how a columnar
//! [`Batch`] is split into independent [`Row`]s, how those rows are processed
//! concurrently, and how the results are regrouped and published through the
//! [`ExecutionContext`]. It also defines the [`LlmProvider`] port that concrete
//! nodes call into. Infrastructure crates implement the port; they never add
//! batch rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`FieldName`, `NodeId`, `ModelName`, `InvocationId`) |
//! | [`types`] | `Batch`, `Row` and batch validation errors |
//! | [`transpose`] | Pure column ⇄ row conversion |
//! | [`context`] | Per-invocation `ExecutionContext` and publish rules |
//! | [`node`] | `BatchNode` trait and the shared fan-out/fan-in algorithm |
//! | [`provider`] | `LlmProvider` port, chat messages, provider errors |
//! | [`errors`] | Top-level `NodeError` and `RetryPolicy` |

pub mod context;
pub mod errors;
pub mod identifiers;
pub mod node;
pub mod provider;
pub mod transpose;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use context::{ExecutionContext, PublishError};
pub use errors::{NodeError, RetryPolicy};
pub use identifiers::{EmptyIdentifier, FieldName, InvocationId, ModelName, NodeId};
pub use node::{execute_rows, BatchNode};
pub use provider::{ChatMessage, ChatRole, LlmError, LlmProvider, ModelSettings};
pub use transpose::{columns_to_rows, rows_to_columns, rows_to_columns_with};
pub use types::{Batch, BatchError, Row};
