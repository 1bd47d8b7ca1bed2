//! The batch node contract and its shared execution algorithm.
//!
//! A [`BatchNode`] declares the fields it reads and writes and implements one
//! unit of work per row. [`execute_rows`] turns that into whole-batch
//! execution:
//!
//! 1. validate the input batch against the declared fields;
//! 2. transpose columns into rows;
//! 3. build one future per row and drive them all concurrently on the calling
//!    task with [`futures::future::try_join_all`];
//! 4. regroup the results into columns in original row order;
//! 5. publish the output exactly once.
//!
//! The first failing row ends the invocation: its sibling futures are dropped
//! (cancelling their in-flight provider calls) and nothing is published.
//! Dropping the future returned by [`BatchNode::execute`] has the same effect,
//! so an engine-side cancellation can never leave partial output behind.

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::Instrument;

use crate::transpose::{columns_to_rows, rows_to_columns_with};
use crate::{Batch, ExecutionContext, FieldName, NodeError, Row};

/// A pipeline node that maps every row of a columnar batch independently.
#[async_trait]
pub trait BatchNode: Send + Sync {
    /// Fields that must be present in every input batch.
    ///
    /// Depends only on construction-time configuration, never on batch
    /// contents.
    fn input_names(&self) -> Vec<FieldName>;

    /// Fields every row result carries, and therefore the output columns.
    fn output_names(&self) -> Vec<FieldName>;

    /// Performs the unit of work for the row at `index`.
    ///
    /// Rows are processed concurrently and must not depend on each other.
    async fn process_row(&self, index: usize, row: Row) -> Result<Row, NodeError>;

    /// Runs the node over the context's input batch and publishes its output.
    async fn execute(&self, context: &mut ExecutionContext) -> Result<(), NodeError> {
        execute_rows(self, context).await
    }
}

/// Validates, fans out, fans in, and publishes for any [`BatchNode`].
pub async fn execute_rows<N>(node: &N, context: &mut ExecutionContext) -> Result<(), NodeError>
where
    N: BatchNode + ?Sized,
{
    let span = tracing::info_span!(
        "execute_batch",
        node = %context.node(),
        invocation = %context.invocation(),
        rows = tracing::field::Empty,
    );

    async move {
        let declared = node.input_names();
        let inputs = context.get_inputs();

        let row_count = inputs.validate(&declared).inspect_err(|e| {
            tracing::warn!(error = %e, "rejecting malformed batch");
        })?;
        tracing::Span::current().record("rows", row_count);

        let rows = columns_to_rows(inputs)?;

        let units = rows.into_iter().enumerate().map(|(index, row)| {
            node.process_row(index, row)
                .instrument(tracing::debug_span!("row", index))
        });
        let results = try_join_all(units).await.inspect_err(|e| {
            tracing::warn!(row = e.row(), error = %e, "batch failed; no output published");
        })?;

        let output = collect_output(node.output_names(), results)?;
        context.set_output(output)?;

        tracing::info!("batch published");
        Ok(())
    }
    .instrument(span)
    .await
}

/// Checks every result against the declared output fields and regroups them
/// into columns.
///
/// An empty result set still yields one (empty) column per declared field so
/// downstream consumers see the node's full output shape.
fn collect_output(mut declared: Vec<FieldName>, results: Vec<Row>) -> Result<Batch, NodeError> {
    declared.sort();
    declared.dedup();

    for (row, result) in results.iter().enumerate() {
        if !result.field_names().eq(declared.iter()) {
            return Err(NodeError::UnexpectedOutputFields {
                row,
                expected: declared,
                actual: result.field_names().cloned().collect(),
            });
        }
    }

    Ok(rows_to_columns_with(declared, results)?)
}
