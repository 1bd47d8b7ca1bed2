//! Top-level error and retry-policy types for batch node execution.
//!
//! [`NodeError`] covers every condition that fails a node, either at
//! construction time or for a whole invocation. Component-level errors
//! ([`crate::BatchError`] for malformed input, [`crate::PublishError`] for
//! context misuse, [`crate::LlmError`] for provider failures) are defined in
//! their respective modules and wrapped here.
//!
//! [`RetryPolicy`] is a cross-cutting concern: any error type that participates
//! in retry decisions must be able to produce a [`RetryPolicy`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{BatchError, FieldName, LlmError, PublishError};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by infrastructure error types so the adapter that owns retries can
/// decide whether to re-issue a request. Nodes never retry; a row failure is
/// final for the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// derived from a `Retry-After` response header).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

impl RetryPolicy {
    /// Returns `true` for [`RetryPolicy::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, RetryPolicy::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Node-level errors
// ---------------------------------------------------------------------------

/// Errors that fail node construction or a whole node invocation.
///
/// There is no partial success: when `execute` returns any of these, nothing
/// has been published to the [`crate::ExecutionContext`].
#[derive(Debug, Error)]
pub enum NodeError {
    /// A collaborator the node cannot work without was not supplied.
    ///
    /// Produced at construction time, before any batch is seen.
    #[error("Missing capability: {capability}")]
    MissingCapability {
        /// Description of the absent collaborator.
        capability: String,
    },

    /// Node configuration is invalid (e.g. an empty model identifier).
    ///
    /// Produced at construction time; a node never starts with an invalid config.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The input batch violates the column contract.
    ///
    /// Detected before any row work is dispatched.
    #[error("Malformed batch: {0}")]
    MalformedBatch(#[from] BatchError),

    /// A row carries a value the node cannot interpret (e.g. a non-string
    /// prompt).
    #[error("Row {row} is invalid: {message}")]
    InvalidRow {
        /// Zero-based row index within the batch.
        row: usize,
        /// Description of the problem.
        message: String,
    },

    /// The provider call for one row failed; the whole batch fails with it.
    #[error("Row {row} failed: {source}")]
    RowFailure {
        /// Zero-based row index within the batch.
        row: usize,
        /// The provider failure.
        #[source]
        source: LlmError,
    },

    /// A row unit produced a result whose keys differ from the node's
    /// declared output fields.
    #[error("Row {row} produced fields {actual:?}, expected {expected:?}")]
    UnexpectedOutputFields {
        /// Zero-based row index within the batch.
        row: usize,
        /// Declared output fields, sorted.
        expected: Vec<FieldName>,
        /// Fields actually produced, sorted.
        actual: Vec<FieldName>,
    },

    /// The node misused the execution context.
    #[error("Publish violation: {0}")]
    Publish(#[from] PublishError),
}

impl NodeError {
    /// Index of the row that caused the failure, when the failure is row-scoped.
    pub fn row(&self) -> Option<usize> {
        match self {
            NodeError::InvalidRow { row, .. }
            | NodeError::RowFailure { row, .. }
            | NodeError::UnexpectedOutputFields { row, .. } => Some(*row),
            _ => None,
        }
    }
}
