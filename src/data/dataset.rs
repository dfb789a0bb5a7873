//! Vertical (columnar) dataset materialization.
//!
//! [`VerticalDataset`] is the engine-facing, row-aligned typed storage.
//! Materialization walks the specification **in spec order** (never caller
//! order), coerces each raw value to the column's semantic type, and resolves
//! categorical values through the spec's fixed vocabulary. The resulting
//! column ordering is exactly the spec's, which is what guarantees feature
//! alignment between training and serving.

use super::column::RawColumn;
use super::spec::{check_alignment, ColumnSpec, ColumnType, DataSpec};
use crate::error::DatasetError;

/// Typed storage for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Missing values are `NaN`.
    Numerical(Vec<f64>),
    /// Category codes into the spec vocabulary; 0 is the
    /// out-of-vocabulary/missing sentinel.
    Categorical(Vec<u32>),
    /// Free text; `None` marks missing rows.
    Text(Vec<Option<String>>),
}

impl ColumnData {
    /// Number of rows in this column.
    pub fn len(&self) -> usize {
        match self {
            Self::Numerical(v) => v.len(),
            Self::Categorical(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    /// Whether the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Row-aligned typed columnar dataset, keyed by spec order.
#[derive(Debug, Clone, PartialEq)]
pub struct VerticalDataset {
    spec: DataSpec,
    columns: Vec<ColumnData>,
    n_rows: usize,
}

impl VerticalDataset {
    /// Materialize raw columns against a specification.
    ///
    /// Spec columns are looked up in the input by name, so extra input
    /// columns are ignored and input order is irrelevant. Categorical values
    /// outside the vocabulary map to the sentinel code 0; the vocabulary is
    /// never mutated here, which keeps prediction-time inputs from shifting
    /// the encoding the model was trained on.
    ///
    /// # Errors
    ///
    /// - [`DatasetError::EmptyColumns`] / [`DatasetError::LengthMismatch`]
    ///   for a malformed input set,
    /// - [`DatasetError::MissingColumn`] when a spec column is absent,
    /// - [`DatasetError::Coercion`] naming column and row when a value does
    ///   not parse as a number for a numeric column.
    pub fn materialize(spec: &DataSpec, raw: &[RawColumn]) -> Result<Self, DatasetError> {
        let n_rows = check_alignment(raw)?;

        let mut columns = Vec::with_capacity(spec.len());
        for column_spec in spec.columns() {
            let input = raw
                .iter()
                .find(|c| c.name() == column_spec.name)
                .ok_or_else(|| DatasetError::MissingColumn(column_spec.name.clone()))?;
            columns.push(materialize_column(column_spec, input)?);
        }

        Ok(Self {
            spec: spec.clone(),
            columns,
            n_rows,
        })
    }

    /// Number of rows; identical across all columns by construction.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// The specification this dataset was materialized against.
    pub fn spec(&self) -> &DataSpec {
        &self.spec
    }

    /// Column storage by spec index.
    pub fn column(&self, index: usize) -> Option<&ColumnData> {
        self.columns.get(index)
    }

    /// Column storage by name.
    pub fn column_by_name(&self, name: &str) -> Option<&ColumnData> {
        self.spec.column_index(name).map(|idx| &self.columns[idx])
    }

    /// Numeric values of a column, if it is numeric.
    pub fn numeric(&self, index: usize) -> Option<&[f64]> {
        match self.columns.get(index) {
            Some(ColumnData::Numerical(v)) => Some(v),
            _ => None,
        }
    }

    /// Category codes of a column, if it is categorical.
    pub fn categorical(&self, index: usize) -> Option<&[u32]> {
        match self.columns.get(index) {
            Some(ColumnData::Categorical(v)) => Some(v),
            _ => None,
        }
    }
}

fn materialize_column(spec: &ColumnSpec, input: &RawColumn) -> Result<ColumnData, DatasetError> {
    match spec.column_type {
        ColumnType::Numerical => {
            let mut values = Vec::with_capacity(input.len());
            for (row, value) in input.values().iter().enumerate() {
                if value.is_null() {
                    values.push(f64::NAN);
                    continue;
                }
                match value.as_number() {
                    Some(n) => values.push(n),
                    None => {
                        return Err(DatasetError::Coercion {
                            column: spec.name.clone(),
                            row,
                        });
                    }
                }
            }
            Ok(ColumnData::Numerical(values))
        }
        ColumnType::Categorical => {
            let codes = input
                .values()
                .iter()
                .map(|value| match value.as_text() {
                    Some(text) => spec.code_for(&text),
                    None => 0,
                })
                .collect();
            Ok(ColumnData::Categorical(codes))
        }
        ColumnType::Text => {
            let values = input
                .values()
                .iter()
                .map(|value| value.as_text().map(|t| t.into_owned()))
                .collect();
            Ok(ColumnData::Text(values))
        }
    }
}
