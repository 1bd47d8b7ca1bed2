//! Columnar and row-wise value types for batch node execution.
//!
//! A [`Batch`] is what the engine hands a node: one column of cell values per
//! field, all columns the same length. A [`Row`] is one unit of work carved out
//! of a batch at a single index. Row results are plain [`Row`]s too and are
//! regrouped into an output [`Batch`] by [`crate::transpose::rows_to_columns`].
//!
//! Cell values are [`serde_json::Value`]; `null` marks a value that is absent
//! for a particular row.

use std::borrow::Borrow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::FieldName;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Violations of the batch column contract.
///
/// These are upstream-contract violations: the batch is rejected as a whole
/// and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// A field the node declared as input is not present in the batch.
    #[error("declared input field '{field}' is missing from the batch")]
    MissingField {
        /// The absent field.
        field: FieldName,
    },

    /// Two columns have different lengths.
    #[error("column '{field}' has {actual} values but column '{reference}' has {expected}")]
    RaggedColumns {
        /// The column whose length defines the batch row count.
        reference: FieldName,
        /// Row count implied by `reference`.
        expected: usize,
        /// The first column that disagrees.
        field: FieldName,
        /// Length of `field`.
        actual: usize,
    },

    /// A row's key set differs from the key set of row 0.
    #[error("row {row} does not have the same fields as row 0")]
    InconsistentRow {
        /// Zero-based index of the offending row.
        row: usize,
    },
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Columnar input or output of one node invocation.
///
/// Maps each field to an ordered sequence of per-row values. Index `i` of
/// every column belongs to the same logical row. Column lengths are not
/// enforced on insertion; call [`Batch::row_count`] or [`Batch::validate`]
/// before relying on them.
///
/// Serialises as a plain JSON object `{ "field": [v0, v1, ...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Batch {
    columns: BTreeMap<FieldName, Vec<Value>>,
}

impl Batch {
    /// Creates a batch with no columns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`Batch::insert_column`].
    #[must_use]
    pub fn with_column(mut self, name: FieldName, values: Vec<Value>) -> Self {
        self.columns.insert(name, values);
        self
    }

    /// Inserts or replaces a column, returning the previous values if any.
    pub fn insert_column(&mut self, name: FieldName, values: Vec<Value>) -> Option<Vec<Value>> {
        self.columns.insert(name, values)
    }

    /// Returns the values of a column, or `None` if the field is absent.
    pub fn column<Q>(&self, name: &Q) -> Option<&[Value]>
    where
        FieldName: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Returns `true` if the batch carries a column for `name`.
    pub fn contains<Q>(&self, name: &Q) -> bool
    where
        FieldName: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.columns.contains_key(name)
    }

    /// Iterates over field names in sorted order.
    pub fn field_names(&self) -> impl Iterator<Item = &FieldName> {
        self.columns.keys()
    }

    /// Iterates over `(field, values)` pairs in field-name order.
    pub fn columns(&self) -> impl Iterator<Item = (&FieldName, &[Value])> {
        self.columns.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the batch has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the common column length.
    ///
    /// A batch with no columns has zero rows. Columns of unequal length are an
    /// error; they are never truncated to the shortest.
    pub fn row_count(&self) -> Result<usize, BatchError> {
        let mut iter = self.columns.iter();
        let Some((reference, first)) = iter.next() else {
            return Ok(0);
        };
        let expected = first.len();

        for (field, values) in iter {
            if values.len() != expected {
                return Err(BatchError::RaggedColumns {
                    reference: reference.clone(),
                    expected,
                    field: field.clone(),
                    actual: values.len(),
                });
            }
        }

        Ok(expected)
    }

    /// Checks that every name in `declared` is present and that all columns
    /// share one length, returning that length.
    ///
    /// Columns present but not declared are allowed; they still take part in
    /// the length check.
    pub fn validate(&self, declared: &[FieldName]) -> Result<usize, BatchError> {
        if let Some(missing) = declared.iter().find(|name| !self.columns.contains_key(*name)) {
            return Err(BatchError::MissingField {
                field: missing.clone(),
            });
        }
        self.row_count()
    }

    /// Consumes the batch, returning its columns.
    pub fn into_columns(self) -> BTreeMap<FieldName, Vec<Value>> {
        self.columns
    }
}

impl FromIterator<(FieldName, Vec<Value>)> for Batch {
    fn from_iter<T: IntoIterator<Item = (FieldName, Vec<Value>)>>(iter: T) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Row
// ---------------------------------------------------------------------------

/// One logical unit of work: a single value per field.
///
/// Used both for the rows a node receives and for the results it returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    fields: BTreeMap<FieldName, Value>,
}

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`Row::insert`].
    #[must_use]
    pub fn with(mut self, name: FieldName, value: Value) -> Self {
        self.fields.insert(name, value);
        self
    }

    /// Inserts or replaces a field value, returning the previous value if any.
    pub fn insert(&mut self, name: FieldName, value: Value) -> Option<Value> {
        self.fields.insert(name, value)
    }

    /// Returns a field value, or `None` if the field is absent.
    pub fn get<Q>(&self, name: &Q) -> Option<&Value>
    where
        FieldName: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.fields.get(name)
    }

    /// Returns the field as a string slice.
    ///
    /// `None` covers an absent field, an explicit `null`, and any non-string
    /// value alike; use [`Row::get`] when those cases must be told apart.
    pub fn get_str<Q>(&self, name: &Q) -> Option<&str>
    where
        FieldName: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(name).and_then(Value::as_str)
    }

    /// Iterates over field names in sorted order.
    pub fn field_names(&self) -> impl Iterator<Item = &FieldName> {
        self.fields.keys()
    }

    /// Number of fields in the row.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the row has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Consumes the row, returning its fields.
    pub fn into_fields(self) -> BTreeMap<FieldName, Value> {
        self.fields
    }
}

impl FromIterator<(FieldName, Value)> for Row {
    fn from_iter<T: IntoIterator<Item = (FieldName, Value)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
