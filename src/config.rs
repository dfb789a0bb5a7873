//! Configuration resolution.
//!
//! A caller hands over a [`ConfigMapping`] (typically deserialized from the
//! host side); [`TrainingConfig::resolve`] validates it against the learner
//! and task registries and produces the validated configuration the engine
//! consumes. Hyperparameter *values* pass through untouched; the engine owns
//! their validation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

// =============================================================================
// Registries
// =============================================================================

/// Training algorithm family, selected by string identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LearnerKind {
    /// Bagged ensemble of decision trees.
    RandomForest,
    /// Gradient-boosted decision trees.
    GradientBoostedTrees,
    /// A single decision tree.
    Cart,
}

/// Registered learner identifiers, in registry order.
pub const REGISTERED_LEARNERS: &[(&str, LearnerKind)] = &[
    ("random_forest", LearnerKind::RandomForest),
    ("gradient_boosted_trees", LearnerKind::GradientBoostedTrees),
    ("cart", LearnerKind::Cart),
];

impl LearnerKind {
    /// Look an identifier up in the registry.
    pub fn parse(id: &str) -> Result<Self, ConfigError> {
        REGISTERED_LEARNERS
            .iter()
            .find(|(name, _)| *name == id)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| ConfigError::UnknownLearner(id.to_string()))
    }

    /// The registry identifier for this learner.
    pub fn id(&self) -> &'static str {
        match self {
            Self::RandomForest => "random_forest",
            Self::GradientBoostedTrees => "gradient_boosted_trees",
            Self::Cart => "cart",
        }
    }
}

/// Prediction objective, selected by string identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    /// Predict a class from a fixed vocabulary.
    Classification,
    /// Predict a continuous value.
    Regression,
    /// Order examples by relevance.
    Ranking,
}

/// Registered task identifiers, in registry order.
pub const REGISTERED_TASKS: &[(&str, TaskKind)] = &[
    ("classification", TaskKind::Classification),
    ("regression", TaskKind::Regression),
    ("ranking", TaskKind::Ranking),
];

impl TaskKind {
    /// Look an identifier up in the registry.
    pub fn parse(id: &str) -> Result<Self, ConfigError> {
        REGISTERED_TASKS
            .iter()
            .find(|(name, _)| *name == id)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| ConfigError::UnknownTask(id.to_string()))
    }

    /// The registry identifier for this task.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Regression => "regression",
            Self::Ranking => "ranking",
        }
    }
}

// =============================================================================
// ConfigMapping
// =============================================================================

/// Caller-supplied configuration, prior to validation.
///
/// The recognized keys mirror the call boundary: `learner`, `task`, `label`,
/// optional `log_directory`, and a nested `options` mapping whose values are
/// opaque to this layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigMapping {
    /// Learner identifier (see [`REGISTERED_LEARNERS`]).
    pub learner: String,

    /// Task identifier (see [`REGISTERED_TASKS`]).
    pub task: String,

    /// Name of the label column in the training data.
    #[serde(default)]
    pub label: String,

    /// Optional directory the engine writes training logs into.
    #[serde(default)]
    pub log_directory: Option<PathBuf>,

    /// Hyperparameters, passed through to the engine unvalidated.
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
}

impl ConfigMapping {
    /// Create a mapping with the three required fields.
    pub fn new(
        learner: impl Into<String>,
        task: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            learner: learner.into(),
            task: task.into(),
            label: label.into(),
            ..Default::default()
        }
    }

    /// Add a hyperparameter.
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Set the training log directory.
    pub fn with_log_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_directory = Some(dir.into());
        self
    }
}

// =============================================================================
// TrainingConfig
// =============================================================================

/// A validated training configuration.
///
/// Only produced by [`TrainingConfig::resolve`]; a value of this type implies
/// the learner and task identifiers were registered and the label is
/// non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub learner: LearnerKind,
    pub task: TaskKind,
    pub label: String,
    pub log_directory: Option<PathBuf>,
    pub options: BTreeMap<String, Value>,
}

impl TrainingConfig {
    /// Validate a [`ConfigMapping`].
    ///
    /// Pure; no engine interaction. Fails on the first violated constraint
    /// and never returns a partial configuration.
    pub fn resolve(mapping: &ConfigMapping) -> Result<Self, ConfigError> {
        let learner = LearnerKind::parse(&mapping.learner)?;
        let task = TaskKind::parse(&mapping.task)?;
        if mapping.label.is_empty() {
            return Err(ConfigError::EmptyLabel);
        }

        Ok(Self {
            learner,
            task,
            label: mapping.label.clone(),
            log_directory: mapping.log_directory.clone(),
            options: mapping.options.clone(),
        })
    }
}
