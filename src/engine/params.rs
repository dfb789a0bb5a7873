//! Hyperparameter interpretation.
//!
//! The config resolver deliberately passes `options` through unvalidated;
//! this is where they are checked. Unknown names and wrong-typed values are
//! rejected rather than ignored, so a typo never silently trains with
//! defaults.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::TrainError;

/// Engine hyperparameters with their defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineParams {
    /// Trees in the ensemble (ignored by `cart`).
    pub num_trees: usize,
    /// Maximum tree depth, root at depth 0.
    pub max_depth: usize,
    /// Minimum rows in a node to attempt a split.
    pub min_examples: usize,
    /// Boosting step size (gradient-boosted trees only).
    pub shrinkage: f32,
    /// Per-round row sampling fraction in (0, 1].
    pub subsample: f32,
    /// Seed for all stochastic sampling.
    pub seed: u64,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            num_trees: 100,
            max_depth: 16,
            min_examples: 2,
            shrinkage: 0.1,
            subsample: 1.0,
            seed: 42,
        }
    }
}

impl EngineParams {
    /// Interpret a pass-through options mapping.
    pub fn from_options(options: &BTreeMap<String, Value>) -> Result<Self, TrainError> {
        let mut params = Self::default();
        for (name, value) in options {
            match name.as_str() {
                "num_trees" => params.num_trees = positive_int(name, value)?,
                "max_depth" => params.max_depth = positive_int(name, value)?,
                "min_examples" => params.min_examples = positive_int(name, value)?,
                "shrinkage" => params.shrinkage = unit_fraction(name, value)?,
                "subsample" => params.subsample = unit_fraction(name, value)?,
                "seed" => {
                    params.seed = value.as_u64().ok_or_else(|| invalid(name, "expected a non-negative integer"))?
                }
                _ => return Err(TrainError::UnknownHyperparameter(name.clone())),
            }
        }
        Ok(params)
    }
}

fn invalid(name: &str, detail: &str) -> TrainError {
    TrainError::InvalidHyperparameter {
        name: name.to_string(),
        detail: detail.to_string(),
    }
}

fn positive_int(name: &str, value: &Value) -> Result<usize, TrainError> {
    match value.as_u64() {
        Some(v) if v >= 1 => Ok(v as usize),
        _ => Err(invalid(name, "expected an integer >= 1")),
    }
}

fn unit_fraction(name: &str, value: &Value) -> Result<f32, TrainError> {
    match value.as_f64() {
        Some(v) if v > 0.0 && v <= 1.0 => Ok(v as f32),
        _ => Err(invalid(name, "expected a number in (0, 1]")),
    }
}
