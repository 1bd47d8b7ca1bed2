//! Per-invocation execution context.
//!
//! The engine creates one [`ExecutionContext`] per node invocation, fills it
//! with the input [`Batch`], hands it to the node, and afterwards takes the
//! published output back out. The context is discarded once the invocation
//! finishes; nothing in it outlives a single batch.

use thiserror::Error;

use crate::{Batch, FieldName, InvocationId, NodeId};

/// Misuse of the publish half of the context.
///
/// A node must publish exactly once per invocation. Both publishing twice and
/// finishing without publishing are programming errors and are reported as
/// soon as they are observable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// `set_output` was called a second time in the same invocation.
    #[error("output was already published for this invocation")]
    AlreadyPublished,

    /// The engine asked for the output but the node never published one.
    #[error("node finished without publishing output")]
    NotPublished,

    /// An output column does not have one value per input row.
    #[error("output column '{field}' has {actual} values, expected {expected}")]
    LengthMismatch {
        /// The offending output column.
        field: FieldName,
        /// Input row count.
        expected: usize,
        /// Length of the output column.
        actual: usize,
    },

    /// Rows went in but the output has no columns to carry them.
    #[error("output has no columns, expected {expected} rows")]
    EmptyOutput {
        /// Input row count.
        expected: usize,
    },
}

/// Inputs and output slot for one node invocation.
#[derive(Debug)]
pub struct ExecutionContext {
    node: NodeId,
    invocation: InvocationId,
    inputs: Batch,
    output: Option<Batch>,
}

impl ExecutionContext {
    /// Creates a context for a fresh invocation of `node` over `inputs`.
    pub fn new(node: NodeId, inputs: Batch) -> Self {
        Self::with_invocation(node, InvocationId::new_random(), inputs)
    }

    /// Creates a context with an invocation id supplied by the engine.
    pub fn with_invocation(node: NodeId, invocation: InvocationId, inputs: Batch) -> Self {
        Self {
            node,
            invocation,
            inputs,
            output: None,
        }
    }

    /// The node this invocation belongs to.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// The identifier of this invocation.
    pub fn invocation(&self) -> InvocationId {
        self.invocation
    }

    /// The input batch. Always the same borrowed view for the whole invocation.
    pub fn get_inputs(&self) -> &Batch {
        &self.inputs
    }

    /// Publishes the node's output.
    ///
    /// May succeed at most once. When the inputs have a well-defined row
    /// count, every output column must match it, and a non-zero row count
    /// needs at least one output column. A rejected call leaves any
    /// previously published output untouched.
    pub fn set_output(&mut self, batch: Batch) -> Result<(), PublishError> {
        if self.output.is_some() {
            tracing::error!(node = %self.node, invocation = %self.invocation, "output published twice");
            return Err(PublishError::AlreadyPublished);
        }

        if let Ok(expected) = self.inputs.row_count() {
            // An input batch without columns carries no row count to check against.
            if !self.inputs.is_empty() {
                if expected > 0 && batch.is_empty() {
                    return Err(PublishError::EmptyOutput { expected });
                }
                if let Some((field, values)) = batch.columns().find(|(_, v)| v.len() != expected) {
                    return Err(PublishError::LengthMismatch {
                        field: field.clone(),
                        expected,
                        actual: values.len(),
                    });
                }
            }
        }

        self.output = Some(batch);
        Ok(())
    }

    /// Returns `true` once output has been published.
    pub fn is_published(&self) -> bool {
        self.output.is_some()
    }

    /// The published output, if any.
    pub fn output(&self) -> Option<&Batch> {
        self.output.as_ref()
    }

    /// Ends the invocation, returning the published output.
    pub fn take_output(self) -> Result<Batch, PublishError> {
        self.output.ok_or(PublishError::NotPublished)
    }
}
