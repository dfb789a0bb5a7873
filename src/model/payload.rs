//! On-disk payload for trained models.
//!
//! The payload is a version-tagged enum serialized with Postcard behind a
//! fixed magic header. New format versions add variants; older readers
//! detect unsupported versions from the header byte before decoding.

use serde::{Deserialize, Serialize};

use super::ModelMeta;
use crate::data::DataSpec;
use crate::engine::Forest;

/// File magic for treeline model files.
pub const MAGIC: &[u8; 4] = b"TRLN";

/// Current format version written by [`super::TrainedModel::save`].
pub const CURRENT_VERSION: u8 = 1;

/// Version-tagged payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    /// Version 1 payload format.
    V1(PayloadV1),
}

/// Version 1: metadata, the training-time data specification, and the forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadV1 {
    pub meta: ModelMeta,
    pub spec: DataSpec,
    pub forest: Forest,
}
