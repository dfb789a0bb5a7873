//! Compiled serving engine for batched inference.
//!
//! [`ServingEngine::compile`] flattens a trained forest into
//! structure-of-arrays node storage and captures the feature layout derived
//! from the model's embedded spec. [`ServingEngine::predict`] then fills an
//! example buffer in that exact layout order and traverses the flattened
//! nodes, so feature alignment with training is structural rather than
//! hoped-for.

use fixedbitset::FixedBitSet;
use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use tracing::debug;

use crate::data::{ColumnData, VerticalDataset};
use crate::engine::tree::{Combiner, Node, OutputTransform, SplitTest};
use crate::engine::{feature_layout, FeatureSlot};
use crate::error::DatasetError;
use crate::model::TrainedModel;

/// Marker for leaf nodes in the flattened child arrays.
const NO_NODE: u32 = u32::MAX;
/// Marker for numeric splits in the flattened mask array.
const NO_MASK: u32 = u32::MAX;

/// How the combined group outputs become one score per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScoreRule {
    /// Regression: the combined value itself.
    Value,
    /// Probability of the given group (binary classification ensembles).
    Probability(usize),
    /// Sigmoid over a single margin (binary logistic boosting).
    LogisticProbability,
    /// Index of the argmax group (multi-class classification).
    ArgmaxIndex,
}

/// Hardware-friendly flattened form of a trained model.
///
/// Compilation is deterministic and idempotent; the model caches one engine
/// per handle (see [`TrainedModel::serving`]), which is safe because models
/// are immutable after training.
#[derive(Debug)]
pub struct ServingEngine {
    slots: Vec<FeatureSlot>,
    base_scores: Vec<f32>,
    combiner: Combiner,
    rule: ScoreRule,
    roots: Vec<u32>,

    // Flattened nodes across all trees.
    feature: Vec<u32>,
    threshold: Vec<f32>,
    mask_id: Vec<u32>,
    left: Vec<u32>,
    right: Vec<u32>,
    default_left: Vec<bool>,
    leaf_offset: Vec<u32>,
    leaf_values: Vec<f32>,
    masks: Vec<FixedBitSet>,
}

impl ServingEngine {
    /// Compile a trained model into its serving form.
    pub fn compile(model: &TrainedModel) -> Self {
        let forest = model.forest();
        let meta = model.meta();
        let slots = feature_layout(model.spec(), &meta.label);

        let rule = match (meta.task, forest.transform, forest.n_groups) {
            (crate::config::TaskKind::Regression, _, _) => ScoreRule::Value,
            (_, OutputTransform::Logistic, _) => ScoreRule::LogisticProbability,
            (_, OutputTransform::Identity, 2) => ScoreRule::Probability(1),
            (_, OutputTransform::Identity, _) => ScoreRule::ArgmaxIndex,
        };

        let mut engine = Self {
            slots,
            base_scores: forest.base_scores.clone(),
            combiner: forest.combiner,
            rule,
            roots: Vec::with_capacity(forest.n_trees()),
            feature: Vec::new(),
            threshold: Vec::new(),
            mask_id: Vec::new(),
            left: Vec::new(),
            right: Vec::new(),
            default_left: Vec::new(),
            leaf_offset: Vec::new(),
            leaf_values: Vec::new(),
            masks: Vec::new(),
        };

        for tree in &forest.trees {
            let base = engine.feature.len() as u32;
            engine.roots.push(base);
            for node in tree.nodes() {
                match node {
                    Node::Leaf { distribution } => {
                        engine.feature.push(0);
                        engine.threshold.push(0.0);
                        engine.mask_id.push(NO_MASK);
                        engine.left.push(NO_NODE);
                        engine.right.push(NO_NODE);
                        engine.default_left.push(false);
                        engine.leaf_offset.push(engine.leaf_values.len() as u32);
                        engine.leaf_values.extend_from_slice(distribution);
                    }
                    Node::Split {
                        feature,
                        test,
                        left,
                        right,
                        default_left,
                    } => {
                        engine.feature.push(*feature);
                        match test {
                            SplitTest::Threshold(t) => {
                                engine.threshold.push(*t);
                                engine.mask_id.push(NO_MASK);
                            }
                            SplitTest::Categories(set) => {
                                engine.threshold.push(0.0);
                                engine.mask_id.push(engine.masks.len() as u32);
                                engine.masks.push(set.clone());
                            }
                        }
                        engine.left.push(base + left);
                        engine.right.push(base + right);
                        engine.default_left.push(*default_left);
                        engine.leaf_offset.push(0);
                    }
                }
            }
        }

        engine
    }

    /// The features the engine expects, in example-buffer order.
    pub fn features(&self) -> &[FeatureSlot] {
        &self.slots
    }

    /// Run batched prediction over a materialized dataset.
    ///
    /// Allocates one example buffer sized to the batch, fills it in layout
    /// order, and scores rows in parallel. Scores come back in input row
    /// order and `result.len() == dataset.n_rows()` always holds.
    ///
    /// # Errors
    ///
    /// [`DatasetError::FeatureMismatch`] when the dataset's columns do not
    /// line up with the layout the model was trained with.
    pub fn predict(&self, dataset: &VerticalDataset) -> Result<Vec<f64>, DatasetError> {
        let n_rows = dataset.n_rows();
        let buffer = self.fill_examples(dataset)?;

        debug!(n_rows, n_features = self.slots.len(), "predict batch");

        let scores: Vec<f64> = (0..n_rows)
            .into_par_iter()
            .map(|row| self.score_row(buffer.row(row)))
            .collect();
        Ok(scores)
    }

    /// Allocate and fill the example buffer `[n_rows, n_features]`.
    fn fill_examples(&self, dataset: &VerticalDataset) -> Result<Array2<f32>, DatasetError> {
        let n_rows = dataset.n_rows();
        let mut buffer = Array2::zeros((n_rows, self.slots.len()));

        for (slot_idx, slot) in self.slots.iter().enumerate() {
            let column = dataset.column_by_name(&slot.name).ok_or_else(|| {
                DatasetError::FeatureMismatch {
                    feature: slot.name.clone(),
                    detail: "column missing from dataset".to_string(),
                }
            })?;
            match column {
                ColumnData::Numerical(values)
                    if slot.column_type == crate::data::ColumnType::Numerical =>
                {
                    for (row, &v) in values.iter().enumerate() {
                        buffer[[row, slot_idx]] = v as f32;
                    }
                }
                ColumnData::Categorical(codes)
                    if slot.column_type == crate::data::ColumnType::Categorical =>
                {
                    for (row, &code) in codes.iter().enumerate() {
                        buffer[[row, slot_idx]] = code as f32;
                    }
                }
                _ => {
                    return Err(DatasetError::FeatureMismatch {
                        feature: slot.name.clone(),
                        detail: "column type differs from the training spec".to_string(),
                    });
                }
            }
        }

        Ok(buffer)
    }

    fn score_row(&self, row: ArrayView1<'_, f32>) -> f64 {
        let mut groups = self.base_scores.clone();
        for &root in &self.roots {
            let leaf = self.leaf_of(root as usize, &row);
            let offset = self.leaf_offset[leaf] as usize;
            for (g, acc) in groups.iter_mut().enumerate() {
                *acc += self.leaf_values[offset + g];
            }
        }
        if self.combiner == Combiner::Average && !self.roots.is_empty() {
            let scale = 1.0 / self.roots.len() as f32;
            for acc in &mut groups {
                *acc *= scale;
            }
        }

        match self.rule {
            ScoreRule::Value => groups[0] as f64,
            ScoreRule::Probability(group) => groups[group] as f64,
            ScoreRule::LogisticProbability => 1.0 / (1.0 + (-groups[0] as f64).exp()),
            ScoreRule::ArgmaxIndex => {
                let mut best = 0usize;
                for (idx, &v) in groups.iter().enumerate() {
                    if v > groups[best] {
                        best = idx;
                    }
                }
                best as f64
            }
        }
    }

    fn leaf_of(&self, mut node: usize, row: &ArrayView1<'_, f32>) -> usize {
        while self.left[node] != NO_NODE {
            let value = row[self.feature[node] as usize];
            let go_left = if self.mask_id[node] == NO_MASK {
                if value.is_nan() {
                    self.default_left[node]
                } else {
                    value < self.threshold[node]
                }
            } else {
                let code = value as usize;
                if value.is_nan() || code == 0 {
                    self.default_left[node]
                } else {
                    !self.masks[self.mask_id[node] as usize].contains(code)
                }
            };
            node = if go_left {
                self.left[node] as usize
            } else {
                self.right[node] as usize
            };
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigMapping, TrainingConfig};
    use crate::data::{DataSpec, RawColumn, SpecGuide};
    use crate::engine;

    fn trained_classifier() -> TrainedModel {
        let cols = vec![
            RawColumn::numeric("x", &[1.0, 2.0, 8.0, 9.0]),
            RawColumn::text("y", &["a", "a", "b", "b"]),
        ];
        let spec = DataSpec::infer(&cols, &SpecGuide::default()).unwrap();
        let ds = VerticalDataset::materialize(&spec, &cols).unwrap();
        let config =
            TrainingConfig::resolve(&ConfigMapping::new("random_forest", "classification", "y"))
                .unwrap();
        engine::train(&config, &ds).unwrap()
    }

    fn feature_batch(model: &TrainedModel, xs: &[f64]) -> VerticalDataset {
        let raw = vec![RawColumn::numeric("x", xs)];
        VerticalDataset::materialize(&model.feature_spec(), &raw).unwrap()
    }

    #[test]
    fn row_count_invariant() {
        let model = trained_classifier();
        let ds = feature_batch(&model, &[1.0, 5.0, 9.0]);
        let scores = model.serving().predict(&ds).unwrap();
        assert_eq!(scores.len(), ds.n_rows());
    }

    #[test]
    fn scores_are_probabilities_in_row_order() {
        let model = trained_classifier();
        let ds = feature_batch(&model, &[1.0, 2.0, 8.0, 9.0]);
        let scores = model.serving().predict(&ds).unwrap();

        for &s in &scores {
            assert!((0.0..=1.0).contains(&s), "score {s} out of [0, 1]");
        }
        assert!(scores[0] < 0.5 && scores[1] < 0.5);
        assert!(scores[2] > 0.5 && scores[3] > 0.5);
    }

    #[test]
    fn compile_is_idempotent_and_cached() {
        let model = trained_classifier();
        let first = model.serving() as *const ServingEngine;
        let second = model.serving() as *const ServingEngine;
        assert_eq!(first, second);

        // Recompiling from scratch yields the same flattened structure.
        let a = ServingEngine::compile(&model);
        let b = ServingEngine::compile(&model);
        assert_eq!(a.feature, b.feature);
        assert_eq!(a.leaf_values, b.leaf_values);
        assert_eq!(a.roots, b.roots);
    }

    #[test]
    fn missing_feature_column_rejected() {
        let model = trained_classifier();
        let raw = vec![RawColumn::numeric("not_x", &[1.0])];
        let spec = DataSpec::infer(&raw, &SpecGuide::default()).unwrap();
        let ds = VerticalDataset::materialize(&spec, &raw).unwrap();

        let err = model.serving().predict(&ds).unwrap_err();
        assert!(matches!(err, DatasetError::FeatureMismatch { .. }));
    }

    #[test]
    fn empty_batch_predicts_nothing() {
        let model = trained_classifier();
        let ds = feature_batch(&model, &[]);
        // Zero-row batches are odd but must not fail or misalign.
        assert_eq!(model.serving().predict(&ds).unwrap().len(), 0);
    }
}
