//! Top-level bridge operations.
//!
//! This is the surface a host binds against: train, predict, save, load,
//! release. Each operation composes the layers below it in a fixed order
//! (resolve config, infer spec, materialize, call the engine, register the
//! handle) and surfaces the first failure untouched. No handle is ever
//! created for a failed training run.

use std::path::Path;

use tracing::info;

use crate::config::{ConfigMapping, TaskKind, TrainingConfig};
use crate::data::{self, DataSpec, RawColumn, SpecGuide, VerticalDataset};
use crate::engine;
use crate::error::Error;
use crate::handle::{self, ModelHandle};
use crate::model::TrainedModel;

/// Training input: columns the host already holds, or a CSV file on disk.
#[derive(Debug, Clone, Copy)]
pub enum TrainData<'a> {
    /// In-memory columns, one per field.
    Columns(&'a [RawColumn]),
    /// Path to a headered CSV file.
    File(&'a Path),
}

/// Train a model and register it in the resource table.
///
/// The label column is forced categorical for classification tasks, so a
/// numeric-looking label such as `"0"`/`"1"` still yields a class
/// vocabulary. Any failure along the pipeline aborts before a handle is
/// allocated.
pub fn train(mapping: &ConfigMapping, data: TrainData<'_>) -> Result<ModelHandle, Error> {
    let config = TrainingConfig::resolve(mapping)?;

    let owned;
    let columns: &[RawColumn] = match data {
        TrainData::Columns(columns) => columns,
        TrainData::File(path) => {
            owned = data::io::read_csv_columns(path)?;
            &owned
        }
    };

    let guide = spec_guide(&config);
    let spec = DataSpec::infer(columns, &guide)?;
    let dataset = VerticalDataset::materialize(&spec, columns)?;

    let model = engine::train(&config, &dataset)?;
    let handle = handle::create(model);
    info!(
        handle = handle.id(),
        learner = config.learner.id(),
        task = config.task.id(),
        rows = dataset.n_rows(),
        "training complete"
    );
    Ok(handle)
}

/// Score a batch of feature columns with a trained model.
///
/// The columns are materialized against the model's embedded feature spec,
/// which is where type and vocabulary alignment with training happens.
/// Returns one score per input row, in row order.
pub fn predict(handle: ModelHandle, columns: &[RawColumn]) -> Result<Vec<f64>, Error> {
    let model = handle::resolve(handle)?;
    let dataset = VerticalDataset::materialize(&model.feature_spec(), columns)?;
    let scores = model.serving().predict(&dataset)?;
    Ok(scores)
}

/// Serialize the model behind a handle to a file.
pub fn save(handle: ModelHandle, path: &Path) -> Result<(), Error> {
    let model = handle::resolve(handle)?;
    model.save(path)
}

/// Load a previously saved model and register it under a fresh handle.
pub fn load(path: &Path) -> Result<ModelHandle, Error> {
    let model = TrainedModel::load(path)?;
    let handle = handle::create(model);
    info!(handle = handle.id(), path = %path.display(), "model loaded");
    Ok(handle)
}

/// Release the model behind a handle. Idempotent; see [`handle::release`].
pub fn release(handle: ModelHandle) -> bool {
    handle::release(handle)
}

fn spec_guide(config: &TrainingConfig) -> SpecGuide {
    let mut guide = SpecGuide::default();
    if config.task == TaskKind::Classification {
        guide.force_categorical.push(config.label.clone());
    }
    guide
}
