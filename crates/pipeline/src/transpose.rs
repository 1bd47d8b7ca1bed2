//! Columnar ⇄ row-wise conversion.
//!
//! Both directions are pure and independent of any node or provider, so the
//! round-trip law can be checked in isolation: for every rectangular batch
//! `b`, zero rows included,
//! `rows_to_columns_with(b.field_names().cloned(), columns_to_rows(&b)?) == b`.
//! Rows alone cannot carry a key set when there are none of them, so the
//! column names travel alongside.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::{Batch, BatchError, FieldName, Row};

/// Splits a batch into one [`Row`] per index.
///
/// Row `i` holds `columns[name][i]` for every column in the batch. Fails with
/// [`BatchError::RaggedColumns`] instead of truncating when column lengths
/// differ.
pub fn columns_to_rows(batch: &Batch) -> Result<Vec<Row>, BatchError> {
    let row_count = batch.row_count()?;

    let rows = (0..row_count)
        .map(|i| {
            batch
                .columns()
                .map(|(name, values)| (name.clone(), values[i].clone()))
                .collect::<Row>()
        })
        .collect();

    Ok(rows)
}

/// Regroups rows into the named columns, preserving row order.
///
/// Every name in `names` becomes a column, even when `rows` is empty. Each row
/// must carry exactly these keys ([`BatchError::InconsistentRow`] otherwise).
pub fn rows_to_columns_with(
    names: impl IntoIterator<Item = FieldName>,
    rows: Vec<Row>,
) -> Result<Batch, BatchError> {
    let row_count = rows.len();
    let mut columns: BTreeMap<FieldName, Vec<Value>> = names
        .into_iter()
        .map(|name| (name, Vec::with_capacity(row_count)))
        .collect();

    for (index, row) in rows.into_iter().enumerate() {
        if row.len() != columns.len() {
            return Err(BatchError::InconsistentRow { row: index });
        }
        for (name, value) in row.into_fields() {
            match columns.get_mut(&name) {
                Some(column) => column.push(value),
                None => return Err(BatchError::InconsistentRow { row: index }),
            }
        }
    }

    Ok(columns.into_iter().collect())
}

/// Regroups rows into columns, taking the column names from row 0.
///
/// An empty input has no names to take and yields an empty batch; use
/// [`rows_to_columns_with`] when the names are known up front.
pub fn rows_to_columns(rows: Vec<Row>) -> Result<Batch, BatchError> {
    let names: Vec<FieldName> = rows
        .first()
        .map(|row| row.field_names().cloned().collect())
        .unwrap_or_default();
    rows_to_columns_with(names, rows)
}
