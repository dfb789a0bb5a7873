//! Trained model container and persistence.
//!
//! A [`TrainedModel`] owns the forest the engine produced together with the
//! [`DataSpec`] the training data was materialized against. Embedding the
//! spec is what lets every later inference call re-validate its input
//! against the exact feature layout the model was trained on.

mod payload;

pub use payload::{Payload, PayloadV1, CURRENT_VERSION, MAGIC};

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{LearnerKind, TaskKind};
use crate::data::DataSpec;
use crate::engine::Forest;
use crate::error::{Error, ModelFormatError};
use crate::serving::ServingEngine;

/// Introspection metadata carried by every trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub learner: LearnerKind,
    pub task: TaskKind,
    /// Name of the label column within the embedded spec.
    pub label: String,
    /// Label vocabulary for classification tasks.
    pub classes: Option<Vec<String>>,
}

/// A trained, immutable model.
///
/// Immutability is load-bearing: it is what makes concurrent predict/save
/// calls against one model safe without locking, and what makes the cached
/// serving engine sound.
#[derive(Debug)]
pub struct TrainedModel {
    forest: Forest,
    spec: DataSpec,
    meta: ModelMeta,
    /// Compiled serving engine, built on first use.
    serving: OnceLock<ServingEngine>,
}

impl TrainedModel {
    /// Wrap a freshly trained forest.
    pub fn new(forest: Forest, spec: DataSpec, meta: ModelMeta) -> Self {
        Self {
            forest,
            spec,
            meta,
            serving: OnceLock::new(),
        }
    }

    /// The underlying forest.
    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    /// The data specification the model was trained with.
    pub fn spec(&self) -> &DataSpec {
        &self.spec
    }

    /// Model metadata.
    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    /// The prediction-time column surface: the training spec minus the
    /// label column.
    pub fn feature_spec(&self) -> DataSpec {
        self.spec.without(&self.meta.label)
    }

    /// The compiled serving engine for this model.
    ///
    /// Compilation is idempotent and cached; the first caller pays the cost.
    pub fn serving(&self) -> &ServingEngine {
        self.serving.get_or_init(|| ServingEngine::compile(self))
    }

    /// Serialize the model to a file.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let payload = Payload::V1(PayloadV1 {
            meta: self.meta.clone(),
            spec: self.spec.clone(),
            forest: self.forest.clone(),
        });
        let body = postcard::to_allocvec(&payload)
            .map_err(|e| ModelFormatError::Payload(e.to_string()))?;

        let mut bytes = Vec::with_capacity(MAGIC.len() + 1 + body.len());
        bytes.extend_from_slice(MAGIC);
        bytes.push(CURRENT_VERSION);
        bytes.extend_from_slice(&body);
        fs::write(path, bytes)?;

        debug!(path = %path.display(), "model saved");
        Ok(())
    }

    /// Load a model previously written by [`TrainedModel::save`].
    pub fn load(path: &Path) -> Result<Self, Error> {
        let bytes = fs::read(path)?;
        let body = bytes
            .strip_prefix(MAGIC.as_slice())
            .ok_or(ModelFormatError::BadMagic)?;
        let (&version, body) = body
            .split_first()
            .ok_or(ModelFormatError::BadMagic)?;
        if version != CURRENT_VERSION {
            return Err(ModelFormatError::UnsupportedVersion(version).into());
        }

        let payload: Payload = postcard::from_bytes(body)
            .map_err(|e| ModelFormatError::Payload(e.to_string()))?;
        let Payload::V1(v1) = payload;
        Ok(Self::new(v1.forest, v1.spec, v1.meta))
    }
}
