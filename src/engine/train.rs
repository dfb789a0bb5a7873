//! Greedy tree growing and the registered learners.
//!
//! One grower serves every learner: it fits a single tree to either class
//! targets (gini impurity) or numeric targets (variance). The learners differ
//! only in how they drive it. `cart` grows one tree on the full data,
//! `random_forest` bags bootstrap replicates, and `gradient_boosted_trees`
//! fits successive trees to residuals.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use fixedbitset::FixedBitSet;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::debug;

use super::params::EngineParams;
use super::tree::{Combiner, Forest, Node, OutputTransform, SplitTest, Tree};
use super::{feature_layout, FeatureKind, FeatureMatrix};
use crate::config::{LearnerKind, TaskKind, TrainingConfig};
use crate::data::VerticalDataset;
use crate::error::{DatasetError, Error, TrainError};
use crate::model::{ModelMeta, TrainedModel};

/// Minimum impurity decrease (scaled by row count) to accept a split.
const MIN_GAIN: f64 = 1e-7;

/// Train a model from a validated configuration and a materialized dataset.
///
/// Blocks the caller for the full training duration; no cancellation or
/// progress reporting. The returned model embeds the dataset's specification
/// so later inference calls stay feature-aligned.
pub fn train(config: &TrainingConfig, dataset: &VerticalDataset) -> Result<TrainedModel, Error> {
    let params = EngineParams::from_options(&config.options)?;

    if config.task == TaskKind::Ranking {
        return Err(TrainError::UnsupportedCombination {
            learner: config.learner.id().to_string(),
            what: "the ranking task".to_string(),
        }
        .into());
    }

    let spec = dataset.spec();
    let label_idx = spec
        .column_index(&config.label)
        .ok_or_else(|| DatasetError::MissingColumn(config.label.clone()))?;

    let layout = feature_layout(spec, &config.label);
    if layout.is_empty() {
        return Err(TrainError::UnsupportedCombination {
            learner: config.learner.id().to_string(),
            what: "a dataset with no usable feature columns".to_string(),
        }
        .into());
    }
    let matrix = FeatureMatrix::from_dataset(dataset, &layout);

    debug!(
        learner = config.learner.id(),
        task = config.task.id(),
        n_rows = matrix.n_rows(),
        n_features = matrix.n_features(),
        "training started"
    );

    let (forest, classes) = match config.task {
        TaskKind::Classification => train_classification(config, &params, &matrix, dataset, label_idx)?,
        TaskKind::Regression => (
            train_regression(config, &params, &matrix, dataset, label_idx)?,
            None,
        ),
        TaskKind::Ranking => unreachable!("rejected above"),
    };

    if let Some(dir) = &config.log_directory {
        write_training_log(dir, config, &forest)?;
    }

    debug!(n_trees = forest.n_trees(), "training finished");

    let meta = ModelMeta {
        learner: config.learner,
        task: config.task,
        label: config.label.clone(),
        classes,
    };
    Ok(TrainedModel::new(forest, spec.clone(), meta))
}

fn train_classification(
    config: &TrainingConfig,
    params: &EngineParams,
    matrix: &FeatureMatrix,
    dataset: &VerticalDataset,
    label_idx: usize,
) -> Result<(Forest, Option<Vec<String>>), Error> {
    let codes = dataset
        .categorical(label_idx)
        .ok_or_else(|| TrainError::LabelType {
            label: config.label.clone(),
            detail: "classification requires a categorical label".to_string(),
        })?;
    let vocabulary = dataset
        .spec()
        .columns()
        .get(label_idx)
        .and_then(|c| c.vocabulary())
        .unwrap_or(&[]);
    let n_classes = vocabulary.len();
    if n_classes < 2 {
        return Err(TrainError::LabelType {
            label: config.label.clone(),
            detail: "classification needs at least two label classes".to_string(),
        }
        .into());
    }

    // Code 0 marks a missing label; training rows must all be labeled.
    let mut classes = Vec::with_capacity(codes.len());
    for (row, &code) in codes.iter().enumerate() {
        if code == 0 {
            return Err(TrainError::MissingLabel {
                label: config.label.clone(),
                row,
            }
            .into());
        }
        classes.push(code - 1);
    }

    let forest = match config.learner {
        LearnerKind::Cart | LearnerKind::RandomForest => {
            let target = GrowTarget::Classes {
                classes: &classes,
                n_classes,
            };
            train_bagged(config.learner, params, matrix, &target, n_classes)
        }
        LearnerKind::GradientBoostedTrees => {
            if n_classes != 2 {
                return Err(TrainError::UnsupportedCombination {
                    learner: config.learner.id().to_string(),
                    what: "multi-class classification".to_string(),
                }
                .into());
            }
            let y: Vec<f32> = classes.iter().map(|&c| c as f32).collect();
            train_gbt_binary(params, matrix, &y)
        }
    };

    Ok((forest, Some(vocabulary.to_vec())))
}

fn train_regression(
    config: &TrainingConfig,
    params: &EngineParams,
    matrix: &FeatureMatrix,
    dataset: &VerticalDataset,
    label_idx: usize,
) -> Result<Forest, Error> {
    let values = dataset
        .numeric(label_idx)
        .ok_or_else(|| TrainError::LabelType {
            label: config.label.clone(),
            detail: "regression requires a numeric label".to_string(),
        })?;

    let mut y = Vec::with_capacity(values.len());
    for (row, &v) in values.iter().enumerate() {
        if v.is_nan() {
            return Err(TrainError::MissingLabel {
                label: config.label.clone(),
                row,
            }
            .into());
        }
        y.push(v as f32);
    }

    Ok(match config.learner {
        LearnerKind::Cart | LearnerKind::RandomForest => {
            let target = GrowTarget::Values { values: &y };
            train_bagged(config.learner, params, matrix, &target, 1)
        }
        LearnerKind::GradientBoostedTrees => train_gbt_regression(params, matrix, &y),
    })
}

// =============================================================================
// Learners
// =============================================================================

/// CART (single tree) and random forest (bootstrap-bagged trees).
fn train_bagged(
    learner: LearnerKind,
    params: &EngineParams,
    matrix: &FeatureMatrix,
    target: &GrowTarget<'_>,
    n_groups: usize,
) -> Forest {
    let n_rows = matrix.n_rows();
    let all_rows: Vec<u32> = (0..n_rows as u32).collect();

    let trees = match learner {
        LearnerKind::Cart => {
            vec![grow_tree(matrix, target, params, all_rows)]
        }
        _ => {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(params.seed);
            (0..params.num_trees)
                .map(|_| {
                    let sample: Vec<u32> = (0..n_rows)
                        .map(|_| rng.gen_range(0..n_rows) as u32)
                        .collect();
                    grow_tree(matrix, target, params, sample)
                })
                .collect()
        }
    };

    Forest {
        trees,
        n_groups,
        base_scores: vec![0.0; n_groups],
        combiner: Combiner::Average,
        transform: OutputTransform::Identity,
    }
}

/// Gradient boosting with squared loss.
fn train_gbt_regression(params: &EngineParams, matrix: &FeatureMatrix, y: &[f32]) -> Forest {
    let n = y.len();
    let base = y.iter().sum::<f32>() / n as f32;
    let mut scores = vec![base; n];
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(params.seed);
    let mut trees = Vec::with_capacity(params.num_trees);

    for _ in 0..params.num_trees {
        let residuals: Vec<f32> = y.iter().zip(&scores).map(|(&y, &s)| y - s).collect();
        let target = GrowTarget::Values {
            values: &residuals,
        };
        let rows = subsample_rows(n, params.subsample, &mut rng);
        let mut tree = grow_tree(matrix, &target, params, rows);
        scale_leaves(&mut tree, params.shrinkage);

        for (row, score) in scores.iter_mut().enumerate() {
            *score += tree.distribution_for(matrix.row(row))[0];
        }
        trees.push(tree);
    }

    Forest {
        trees,
        n_groups: 1,
        base_scores: vec![base],
        combiner: Combiner::Sum,
        transform: OutputTransform::Identity,
    }
}

/// Binary logistic gradient boosting; `y` holds 0/1 class indicators.
fn train_gbt_binary(params: &EngineParams, matrix: &FeatureMatrix, y: &[f32]) -> Forest {
    let n = y.len();
    let p = (y.iter().sum::<f32>() / n as f32).clamp(1e-6, 1.0 - 1e-6);
    let base = (p / (1.0 - p)).ln();
    let mut scores = vec![base; n];
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(params.seed);
    let mut trees = Vec::with_capacity(params.num_trees);

    for _ in 0..params.num_trees {
        let probs: Vec<f32> = scores.iter().map(|&s| sigmoid(s)).collect();
        let residuals: Vec<f32> = y.iter().zip(&probs).map(|(&y, &p)| y - p).collect();
        let target = GrowTarget::Values {
            values: &residuals,
        };
        let rows = subsample_rows(n, params.subsample, &mut rng);
        let mut tree = grow_tree(matrix, &target, params, rows.clone());

        // Newton step per leaf: sum(residual) / sum(p * (1 - p)).
        let mut numerator = vec![0.0f64; tree.n_nodes()];
        let mut denominator = vec![0.0f64; tree.n_nodes()];
        for &row in &rows {
            let row = row as usize;
            let leaf = tree.leaf_for(matrix.row(row));
            numerator[leaf] += residuals[row] as f64;
            denominator[leaf] += (probs[row] * (1.0 - probs[row])) as f64;
        }
        for (idx, node) in tree.nodes_mut().iter_mut().enumerate() {
            if let Node::Leaf { distribution } = node {
                let value = if denominator[idx] > 1e-12 {
                    (numerator[idx] / denominator[idx]) as f32
                } else {
                    0.0
                };
                distribution[0] = params.shrinkage * value;
            }
        }

        for (row, score) in scores.iter_mut().enumerate() {
            *score += tree.distribution_for(matrix.row(row))[0];
        }
        trees.push(tree);
    }

    Forest {
        trees,
        n_groups: 1,
        base_scores: vec![base],
        combiner: Combiner::Sum,
        transform: OutputTransform::Logistic,
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn scale_leaves(tree: &mut Tree, factor: f32) {
    for node in tree.nodes_mut() {
        if let Node::Leaf { distribution } = node {
            for v in distribution {
                *v *= factor;
            }
        }
    }
}

fn subsample_rows(n_rows: usize, fraction: f32, rng: &mut Xoshiro256PlusPlus) -> Vec<u32> {
    if fraction >= 1.0 {
        return (0..n_rows as u32).collect();
    }
    let rows: Vec<u32> = (0..n_rows as u32)
        .filter(|_| rng.gen::<f32>() < fraction)
        .collect();
    if rows.is_empty() {
        (0..n_rows as u32).collect()
    } else {
        rows
    }
}

// =============================================================================
// Tree growing
// =============================================================================

/// What a tree is fit to.
pub(crate) enum GrowTarget<'a> {
    /// 0-based class indices; leaves hold class distributions.
    Classes { classes: &'a [u32], n_classes: usize },
    /// Numeric targets; leaves hold the mean.
    Values { values: &'a [f32] },
}

/// Sufficient statistics of a row subset under a target.
#[derive(Debug, Clone)]
enum NodeStats {
    Classes { counts: Vec<f64>, n: f64 },
    Values { sum: f64, sum_sq: f64, n: f64 },
}

impl NodeStats {
    fn empty(target: &GrowTarget<'_>) -> Self {
        match target {
            GrowTarget::Classes { n_classes, .. } => Self::Classes {
                counts: vec![0.0; *n_classes],
                n: 0.0,
            },
            GrowTarget::Values { .. } => Self::Values {
                sum: 0.0,
                sum_sq: 0.0,
                n: 0.0,
            },
        }
    }

    fn collect(target: &GrowTarget<'_>, rows: &[u32]) -> Self {
        let mut stats = Self::empty(target);
        for &row in rows {
            stats.add(target, row as usize);
        }
        stats
    }

    fn add(&mut self, target: &GrowTarget<'_>, row: usize) {
        match (self, target) {
            (Self::Classes { counts, n }, GrowTarget::Classes { classes, .. }) => {
                counts[classes[row] as usize] += 1.0;
                *n += 1.0;
            }
            (Self::Values { sum, sum_sq, n }, GrowTarget::Values { values }) => {
                let v = values[row] as f64;
                *sum += v;
                *sum_sq += v * v;
                *n += 1.0;
            }
            _ => unreachable!("stats and target kinds always match"),
        }
    }

    fn merge(&mut self, other: &Self) {
        match (self, other) {
            (Self::Classes { counts, n }, Self::Classes { counts: oc, n: on }) => {
                for (c, o) in counts.iter_mut().zip(oc) {
                    *c += o;
                }
                *n += on;
            }
            (
                Self::Values { sum, sum_sq, n },
                Self::Values {
                    sum: os,
                    sum_sq: osq,
                    n: on,
                },
            ) => {
                *sum += os;
                *sum_sq += osq;
                *n += on;
            }
            _ => unreachable!("stats kinds always match"),
        }
    }

    fn subtract(&mut self, other: &Self) {
        match (self, other) {
            (Self::Classes { counts, n }, Self::Classes { counts: oc, n: on }) => {
                for (c, o) in counts.iter_mut().zip(oc) {
                    *c -= o;
                }
                *n -= on;
            }
            (
                Self::Values { sum, sum_sq, n },
                Self::Values {
                    sum: os,
                    sum_sq: osq,
                    n: on,
                },
            ) => {
                *sum -= os;
                *sum_sq -= osq;
                *n -= on;
            }
            _ => unreachable!("stats kinds always match"),
        }
    }

    fn n(&self) -> f64 {
        match self {
            Self::Classes { n, .. } => *n,
            Self::Values { n, .. } => *n,
        }
    }

    /// Gini impurity or variance.
    fn impurity(&self) -> f64 {
        match self {
            Self::Classes { counts, n } => {
                if *n <= 0.0 {
                    return 0.0;
                }
                let mut gini = 1.0;
                for count in counts {
                    let p = count / n;
                    gini -= p * p;
                }
                gini
            }
            Self::Values { sum, sum_sq, n } => {
                if *n <= 0.0 {
                    return 0.0;
                }
                let mean = sum / n;
                (sum_sq / n - mean * mean).max(0.0)
            }
        }
    }

    fn is_pure(&self) -> bool {
        match self {
            Self::Classes { counts, .. } => counts.iter().filter(|&&c| c > 0.0).count() <= 1,
            Self::Values { .. } => self.impurity() < 1e-12,
        }
    }

    /// Mean target, used to order categories for categorical splits. For
    /// class targets this is the mean class index, which is exact for binary
    /// labels and a deterministic heuristic beyond that.
    fn ordering_score(&self) -> f64 {
        match self {
            Self::Classes { counts, n } => {
                if *n <= 0.0 {
                    return 0.0;
                }
                counts
                    .iter()
                    .enumerate()
                    .map(|(idx, c)| idx as f64 * c)
                    .sum::<f64>()
                    / n
            }
            Self::Values { sum, n, .. } if *n > 0.0 => sum / n,
            Self::Values { .. } => 0.0,
        }
    }

    fn leaf_distribution(&self) -> Vec<f32> {
        match self {
            Self::Classes { counts, n } => {
                if *n <= 0.0 {
                    return vec![0.0; counts.len()];
                }
                counts.iter().map(|c| (c / n) as f32).collect()
            }
            Self::Values { sum, n, .. } => {
                let mean = if *n > 0.0 { sum / n } else { 0.0 };
                vec![mean as f32]
            }
        }
    }
}

struct SplitCandidate {
    feature: u32,
    test: SplitTest,
    gain: f64,
    default_left: bool,
}

struct TreeGrower<'a> {
    matrix: &'a FeatureMatrix,
    target: &'a GrowTarget<'a>,
    params: &'a EngineParams,
    nodes: Vec<Node>,
}

/// Grow one tree over a row subset.
pub(crate) fn grow_tree(
    matrix: &FeatureMatrix,
    target: &GrowTarget<'_>,
    params: &EngineParams,
    rows: Vec<u32>,
) -> Tree {
    let mut grower = TreeGrower {
        matrix,
        target,
        params,
        nodes: Vec::new(),
    };
    grower.grow_node(rows, 0);
    Tree::new(grower.nodes)
}

impl TreeGrower<'_> {
    fn grow_node(&mut self, rows: Vec<u32>, depth: usize) -> u32 {
        let stats = NodeStats::collect(self.target, &rows);

        if depth >= self.params.max_depth
            || rows.len() < self.params.min_examples
            || stats.is_pure()
        {
            return self.push_leaf(&stats);
        }

        let Some(split) = self.best_split(&rows) else {
            return self.push_leaf(&stats);
        };

        let (left_rows, right_rows) = self.partition(&rows, &split);
        if left_rows.is_empty() || right_rows.is_empty() {
            return self.push_leaf(&stats);
        }

        // Reserve the slot so children end up after their parent.
        let id = self.nodes.len() as u32;
        self.nodes.push(Node::Leaf {
            distribution: Vec::new(),
        });
        let left = self.grow_node(left_rows, depth + 1);
        let right = self.grow_node(right_rows, depth + 1);
        self.nodes[id as usize] = Node::Split {
            feature: split.feature,
            test: split.test,
            left,
            right,
            default_left: split.default_left,
        };
        id
    }

    fn push_leaf(&mut self, stats: &NodeStats) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(Node::Leaf {
            distribution: stats.leaf_distribution(),
        });
        id
    }

    fn best_split(&self, rows: &[u32]) -> Option<SplitCandidate> {
        let mut best: Option<SplitCandidate> = None;
        for feature in 0..self.matrix.n_features() {
            let candidate = match self.matrix.kind(feature) {
                FeatureKind::Numerical => self.best_numeric_split(feature, rows),
                FeatureKind::Categorical { cardinality } => {
                    self.best_categorical_split(feature, rows, cardinality)
                }
            };
            if let Some(candidate) = candidate {
                if best.as_ref().map(|b| candidate.gain > b.gain).unwrap_or(true) {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    fn best_numeric_split(&self, feature: usize, rows: &[u32]) -> Option<SplitCandidate> {
        let mut present: Vec<u32> = rows
            .iter()
            .copied()
            .filter(|&r| !self.matrix.get(r as usize, feature).is_nan())
            .collect();
        if present.len() < 2 {
            return None;
        }
        present.sort_by(|&a, &b| {
            self.matrix
                .get(a as usize, feature)
                .partial_cmp(&self.matrix.get(b as usize, feature))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let total = NodeStats::collect(self.target, &present);
        let mut left = NodeStats::empty(self.target);
        let parent_cost = total.impurity() * total.n();

        let mut best: Option<SplitCandidate> = None;
        for window in 0..present.len() - 1 {
            let row = present[window] as usize;
            left.add(self.target, row);
            // Only split between distinct values.
            let value = self.matrix.get(row, feature);
            let next = self.matrix.get(present[window + 1] as usize, feature);
            if next <= value {
                continue;
            }

            let mut right = total.clone();
            right.subtract(&left);
            let gain = parent_cost - (left.impurity() * left.n() + right.impurity() * right.n());
            if gain > MIN_GAIN && best.as_ref().map(|b| gain > b.gain).unwrap_or(true) {
                best = Some(SplitCandidate {
                    feature: feature as u32,
                    test: SplitTest::Threshold((value + next) / 2.0),
                    gain,
                    default_left: left.n() >= right.n(),
                });
            }
        }
        best
    }

    fn best_categorical_split(
        &self,
        feature: usize,
        rows: &[u32],
        cardinality: usize,
    ) -> Option<SplitCandidate> {
        let mut per_category: Vec<NodeStats> =
            (0..cardinality).map(|_| NodeStats::empty(self.target)).collect();
        for &row in rows {
            let code = self.matrix.get(row as usize, feature) as usize;
            if code == 0 || code >= cardinality {
                continue;
            }
            per_category[code].add(self.target, row as usize);
        }

        let mut categories: Vec<usize> = (1..cardinality)
            .filter(|&code| per_category[code].n() > 0.0)
            .collect();
        if categories.len() < 2 {
            return None;
        }
        // Order by mean target, ties broken by code for determinism.
        categories.sort_by(|&a, &b| {
            let (sa, sb) = (
                per_category[a].ordering_score(),
                per_category[b].ordering_score(),
            );
            sa.partial_cmp(&sb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        let mut total = NodeStats::empty(self.target);
        for &code in &categories {
            total.merge(&per_category[code]);
        }
        let parent_cost = total.impurity() * total.n();

        let mut left = NodeStats::empty(self.target);
        let mut best: Option<(usize, f64, bool)> = None; // (prefix len, gain, default_left)
        for k in 0..categories.len() - 1 {
            left.merge(&per_category[categories[k]]);
            let mut right = total.clone();
            right.subtract(&left);
            let gain = parent_cost - (left.impurity() * left.n() + right.impurity() * right.n());
            if gain > MIN_GAIN && best.map(|(_, g, _)| gain > g).unwrap_or(true) {
                best = Some((k + 1, gain, left.n() >= right.n()));
            }
        }

        best.map(|(prefix, gain, default_left)| {
            // The suffix categories form the in-set (right) side.
            let mut set = FixedBitSet::with_capacity(cardinality);
            for &code in &categories[prefix..] {
                set.insert(code);
            }
            SplitCandidate {
                feature: feature as u32,
                test: SplitTest::Categories(set),
                gain,
                default_left,
            }
        })
    }

    fn partition(&self, rows: &[u32], split: &SplitCandidate) -> (Vec<u32>, Vec<u32>) {
        let mut left_rows = Vec::new();
        let mut right_rows = Vec::new();
        for &row in rows {
            let value = self.matrix.get(row as usize, split.feature as usize);
            let go_left = match &split.test {
                SplitTest::Threshold(threshold) => {
                    if value.is_nan() {
                        split.default_left
                    } else {
                        value < *threshold
                    }
                }
                SplitTest::Categories(set) => {
                    let code = value as usize;
                    if value.is_nan() || code == 0 {
                        split.default_left
                    } else {
                        !set.contains(code)
                    }
                }
            };
            if go_left {
                left_rows.push(row);
            } else {
                right_rows.push(row);
            }
        }
        (left_rows, right_rows)
    }
}

// =============================================================================
// Training log
// =============================================================================

/// Append a per-tree summary to `<dir>/training.log`.
fn write_training_log(dir: &Path, config: &TrainingConfig, forest: &Forest) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("training.log"))?;

    writeln!(
        file,
        "learner={} task={} label={} trees={}",
        config.learner.id(),
        config.task.id(),
        config.label,
        forest.n_trees()
    )?;
    for (idx, tree) in forest.trees.iter().enumerate() {
        writeln!(file, "  tree {idx}: {} nodes", tree.n_nodes())?;
    }
    Ok(())
}
