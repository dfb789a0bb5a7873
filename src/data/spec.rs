//! Data specification inference.
//!
//! A [`DataSpec`] is the inferred schema of a dataset: per-column names,
//! semantic types, and domains. It is built once per dataset and embedded in
//! the trained model, where it validates every later inference call so that
//! features stay aligned with the representation the model was trained on.
//!
//! Inference is deterministic: identical input always yields an identical
//! specification. This is a hard invariant, not an optimization: the same
//! spec must re-validate prediction-time columns for the life of the model.

use serde::{Deserialize, Serialize};

use super::column::RawColumn;
use crate::error::DatasetError;

/// Maximum number of distinct values for a textual column to be inferred as
/// categorical rather than free text.
pub const MAX_VOCABULARY_SIZE: usize = 64;

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// Finite floating-point values; missing is permitted.
    Numerical,
    /// Values drawn from a fixed vocabulary established at spec-build time.
    Categorical,
    /// Free text; carried but not used as a split feature.
    Text,
}

/// Per-column domain information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnDomain {
    /// Observed numeric range.
    Numerical { min: f64, max: f64 },
    /// Sorted, deduplicated vocabulary. Stored category codes are `1..=len`;
    /// code 0 is reserved for out-of-vocabulary and missing values.
    Categorical { vocabulary: Vec<String> },
    /// No domain.
    Text,
}

/// One column descriptor: name, semantic type, domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub domain: ColumnDomain,
}

impl ColumnSpec {
    /// The vocabulary, for categorical columns.
    pub fn vocabulary(&self) -> Option<&[String]> {
        match &self.domain {
            ColumnDomain::Categorical { vocabulary } => Some(vocabulary),
            _ => None,
        }
    }

    /// Resolve a textual value to its category code.
    ///
    /// Codes are 1-based; 0 is the out-of-vocabulary sentinel. Values outside
    /// the vocabulary map to the sentinel rather than failing, so novel
    /// categories at prediction time are representable.
    pub fn code_for(&self, value: &str) -> u32 {
        match self.vocabulary() {
            Some(vocab) => match vocab.binary_search_by(|v| v.as_str().cmp(value)) {
                Ok(idx) => idx as u32 + 1,
                Err(_) => 0,
            },
            None => 0,
        }
    }

    /// The vocabulary entry for a category code, if any.
    pub fn category_name(&self, code: u32) -> Option<&str> {
        if code == 0 {
            return None;
        }
        self.vocabulary()
            .and_then(|v| v.get(code as usize - 1))
            .map(String::as_str)
    }

    /// Number of category codes including the sentinel (`vocabulary + 1`),
    /// or 0 for non-categorical columns.
    pub fn cardinality(&self) -> usize {
        self.vocabulary().map(|v| v.len() + 1).unwrap_or(0)
    }
}

/// Hints applied during inference.
///
/// The orchestrator forces the label column to categorical for
/// classification tasks; nothing else is guided.
#[derive(Debug, Clone, Default)]
pub struct SpecGuide {
    /// Columns to treat as categorical regardless of their contents.
    /// A guided column is exempt from [`MAX_VOCABULARY_SIZE`].
    pub force_categorical: Vec<String>,
}

impl SpecGuide {
    fn forces(&self, name: &str) -> bool {
        self.force_categorical.iter().any(|c| c == name)
    }
}

/// Ordered sequence of column descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSpec {
    columns: Vec<ColumnSpec>,
}

impl DataSpec {
    /// Infer a specification from in-memory columns.
    ///
    /// Per column, in caller order:
    /// - numeric if every present value parses as a finite number,
    /// - otherwise categorical if the distinct-value count is at most
    ///   [`MAX_VOCABULARY_SIZE`],
    /// - otherwise free text.
    ///
    /// Vocabularies are sorted lexicographically, which together with the
    /// rules above makes inference fully deterministic.
    ///
    /// # Errors
    ///
    /// [`DatasetError`] on an empty column set, unequal column lengths, or a
    /// column with zero present values.
    pub fn infer(columns: &[RawColumn], guide: &SpecGuide) -> Result<Self, DatasetError> {
        check_alignment(columns)?;

        let mut specs = Vec::with_capacity(columns.len());
        for column in columns {
            let present = column.values().iter().filter(|v| !v.is_null()).count();
            if present == 0 {
                return Err(DatasetError::EmptyColumn(column.name().to_string()));
            }
            specs.push(infer_column(column, guide));
        }

        Ok(Self { columns: specs })
    }

    /// Build a spec directly from column descriptors.
    pub fn from_columns(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    /// Column descriptors in declared order.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the spec has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Find a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// A copy of this spec without the named column.
    ///
    /// Used to drop the label column from the prediction-time surface.
    pub fn without(&self, name: &str) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .filter(|c| c.name != name)
                .cloned()
                .collect(),
        }
    }
}

/// Validate that the column set is non-empty and row-aligned.
///
/// Returns the common row count.
pub(crate) fn check_alignment(columns: &[RawColumn]) -> Result<usize, DatasetError> {
    let first = columns.first().ok_or(DatasetError::EmptyColumns)?;
    let n_rows = first.len();
    for column in columns {
        if column.len() != n_rows {
            return Err(DatasetError::LengthMismatch {
                column: column.name().to_string(),
                expected: n_rows,
                got: column.len(),
            });
        }
    }
    Ok(n_rows)
}

fn infer_column(column: &RawColumn, guide: &SpecGuide) -> ColumnSpec {
    let name = column.name().to_string();

    if !guide.forces(&name) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut all_numeric = true;
        for value in column.values() {
            if value.is_null() {
                continue;
            }
            match value.as_number() {
                Some(n) => {
                    min = min.min(n);
                    max = max.max(n);
                }
                None => {
                    all_numeric = false;
                    break;
                }
            }
        }
        if all_numeric {
            return ColumnSpec {
                name,
                column_type: ColumnType::Numerical,
                domain: ColumnDomain::Numerical { min, max },
            };
        }
    }

    let vocabulary = build_vocabulary(column);
    if guide.forces(&name) || vocabulary.len() <= MAX_VOCABULARY_SIZE {
        ColumnSpec {
            name,
            column_type: ColumnType::Categorical,
            domain: ColumnDomain::Categorical { vocabulary },
        }
    } else {
        ColumnSpec {
            name,
            column_type: ColumnType::Text,
            domain: ColumnDomain::Text,
        }
    }
}

fn build_vocabulary(column: &RawColumn) -> Vec<String> {
    let mut vocabulary: Vec<String> = column
        .values()
        .iter()
        .filter_map(|v| v.as_text().map(|t| t.into_owned()))
        .collect();
    vocabulary.sort_unstable();
    vocabulary.dedup();
    vocabulary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::column::RawValue;

    fn sample_columns() -> Vec<RawColumn> {
        vec![
            RawColumn::numeric("x", &[1.0, 2.0, 8.0, 9.0]),
            RawColumn::text("y", &["a", "a", "b", "b"]),
        ]
    }

    #[test]
    fn infers_numeric_and_categorical() {
        let spec = DataSpec::infer(&sample_columns(), &SpecGuide::default()).unwrap();

        assert_eq!(spec.len(), 2);
        assert_eq!(spec.columns()[0].column_type, ColumnType::Numerical);
        assert_eq!(
            spec.columns()[0].domain,
            ColumnDomain::Numerical { min: 1.0, max: 9.0 }
        );
        assert_eq!(spec.columns()[1].column_type, ColumnType::Categorical);
        assert_eq!(spec.columns()[1].vocabulary().unwrap(), ["a", "b"]);
    }

    #[test]
    fn inference_is_deterministic() {
        let guide = SpecGuide::default();
        let first = DataSpec::infer(&sample_columns(), &guide).unwrap();
        let second = DataSpec::infer(&sample_columns(), &guide).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn numeric_as_text_is_numeric() {
        let cols = vec![RawColumn::text("n", &["1", "2.5", " 3 "])];
        let spec = DataSpec::infer(&cols, &SpecGuide::default()).unwrap();
        assert_eq!(spec.columns()[0].column_type, ColumnType::Numerical);
    }

    #[test]
    fn nulls_do_not_veto_numeric() {
        let cols = vec![RawColumn::new(
            "n",
            vec![RawValue::Number(1.0), RawValue::Null, RawValue::Number(3.0)],
        )];
        let spec = DataSpec::infer(&cols, &SpecGuide::default()).unwrap();
        assert_eq!(spec.columns()[0].column_type, ColumnType::Numerical);
    }

    #[test]
    fn wide_text_column_is_text() {
        let values: Vec<String> = (0..200).map(|i| format!("value-{i}")).collect();
        let cols = vec![RawColumn::text("t", &values)];
        let spec = DataSpec::infer(&cols, &SpecGuide::default()).unwrap();
        assert_eq!(spec.columns()[0].column_type, ColumnType::Text);
    }

    #[test]
    fn guide_forces_categorical() {
        let cols = vec![RawColumn::numeric("label", &[0.0, 1.0, 1.0])];
        let guide = SpecGuide {
            force_categorical: vec!["label".into()],
        };
        let spec = DataSpec::infer(&cols, &guide).unwrap();
        assert_eq!(spec.columns()[0].column_type, ColumnType::Categorical);
        assert_eq!(spec.columns()[0].vocabulary().unwrap(), ["0", "1"]);
    }

    #[test]
    fn empty_column_set_rejected() {
        assert_eq!(
            DataSpec::infer(&[], &SpecGuide::default()),
            Err(DatasetError::EmptyColumns)
        );
    }

    #[test]
    fn ragged_columns_rejected() {
        let cols = vec![
            RawColumn::numeric("x", &[1.0, 2.0, 3.0]),
            RawColumn::numeric("y", &[1.0]),
        ];
        assert_eq!(
            DataSpec::infer(&cols, &SpecGuide::default()),
            Err(DatasetError::LengthMismatch {
                column: "y".into(),
                expected: 3,
                got: 1,
            })
        );
    }

    #[test]
    fn all_null_column_rejected() {
        let cols = vec![RawColumn::new("v", vec![RawValue::Null, RawValue::Null])];
        assert_eq!(
            DataSpec::infer(&cols, &SpecGuide::default()),
            Err(DatasetError::EmptyColumn("v".into()))
        );
    }

    #[test]
    fn code_resolution_and_sentinel() {
        let spec = DataSpec::infer(&sample_columns(), &SpecGuide::default()).unwrap();
        let y = &spec.columns()[1];

        assert_eq!(y.code_for("a"), 1);
        assert_eq!(y.code_for("b"), 2);
        // Out of vocabulary maps to the sentinel, never an error.
        assert_eq!(y.code_for("c"), 0);
        assert_eq!(y.category_name(1), Some("a"));
        assert_eq!(y.category_name(0), None);
        assert_eq!(y.cardinality(), 3);
    }

    #[test]
    fn without_drops_a_column() {
        let spec = DataSpec::infer(&sample_columns(), &SpecGuide::default()).unwrap();
        let features = spec.without("y");
        assert_eq!(features.len(), 1);
        assert!(features.column("y").is_none());
        assert!(features.column("x").is_some());
    }

    #[test]
    fn spec_serde_round_trip() {
        let spec = DataSpec::infer(&sample_columns(), &SpecGuide::default()).unwrap();
        let json = serde_json::to_string(&spec).unwrap();
        let restored: DataSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, restored);
    }
}
