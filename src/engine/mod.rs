//! The decision-forest engine.
//!
//! Everything under this module sits behind the bridge's engine interface:
//! tree representation, hyperparameter interpretation, and the registered
//! learners. The bridge validates inputs before calling in; the engine owns
//! hyperparameter validation and label/task compatibility.

mod params;
pub mod train;
pub mod tree;

pub use params::EngineParams;
pub use train::train;
pub use tree::{Combiner, Forest, Node, OutputTransform, SplitTest, Tree};

use crate::data::{ColumnData, ColumnType, DataSpec, VerticalDataset};

/// One feature position in the engine's example layout.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSlot {
    /// Index of the column in the data specification.
    pub spec_index: usize,
    pub name: String,
    pub column_type: ColumnType,
}

/// The engine's feature layout for a specification: every non-label,
/// non-text column, in spec order.
///
/// Training and serving both derive the layout through this function, which
/// is what keeps example buffers aligned with the trained trees.
pub fn feature_layout(spec: &DataSpec, label: &str) -> Vec<FeatureSlot> {
    spec.columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| c.name != label && c.column_type != ColumnType::Text)
        .map(|(spec_index, c)| FeatureSlot {
            spec_index,
            name: c.name.clone(),
            column_type: c.column_type,
        })
        .collect()
}

/// Row-major training matrix in layout order.
///
/// Numeric features keep their value (`NaN` = missing); categorical features
/// store their category code as `f32` (0 = missing/out-of-vocabulary), the
/// same encoding the serving buffer uses.
#[derive(Debug)]
pub(crate) struct FeatureMatrix {
    values: Vec<f32>,
    n_rows: usize,
    n_features: usize,
    kinds: Vec<FeatureKind>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum FeatureKind {
    Numerical,
    Categorical {
        /// Number of category codes including the sentinel.
        cardinality: usize,
    },
}

impl FeatureMatrix {
    pub(crate) fn from_dataset(dataset: &VerticalDataset, layout: &[FeatureSlot]) -> Self {
        let n_rows = dataset.n_rows();
        let n_features = layout.len();
        let mut values = vec![0.0f32; n_rows * n_features];
        let mut kinds = Vec::with_capacity(n_features);

        for (feat, slot) in layout.iter().enumerate() {
            match dataset.column(slot.spec_index) {
                Some(ColumnData::Numerical(col)) => {
                    kinds.push(FeatureKind::Numerical);
                    for (row, &v) in col.iter().enumerate() {
                        values[row * n_features + feat] = v as f32;
                    }
                }
                Some(ColumnData::Categorical(col)) => {
                    let cardinality = dataset
                        .spec()
                        .columns()
                        .get(slot.spec_index)
                        .map(|c| c.cardinality())
                        .unwrap_or(1);
                    kinds.push(FeatureKind::Categorical { cardinality });
                    for (row, &code) in col.iter().enumerate() {
                        values[row * n_features + feat] = code as f32;
                    }
                }
                // Layout never contains text columns.
                _ => kinds.push(FeatureKind::Numerical),
            }
        }

        Self {
            values,
            n_rows,
            n_features,
            kinds,
        }
    }

    #[inline]
    pub(crate) fn get(&self, row: usize, feature: usize) -> f32 {
        self.values[row * self.n_features + feature]
    }

    #[inline]
    pub(crate) fn row(&self, row: usize) -> &[f32] {
        &self.values[row * self.n_features..(row + 1) * self.n_features]
    }

    pub(crate) fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub(crate) fn n_features(&self) -> usize {
        self.n_features
    }

    pub(crate) fn kind(&self, feature: usize) -> FeatureKind {
        self.kinds[feature]
    }
}
