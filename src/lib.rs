//! treeline: a bridge between host applications and a decision-forest engine.
//!
//! The crate takes caller-supplied configuration and columnar data, infers a
//! typed data specification, materializes a columnar dataset, trains a
//! decision forest (CART, random forest, or gradient-boosted trees), and
//! hands the result back as an opaque handle. Later calls predict with,
//! save, load, and release models through that handle.
//!
//! # Key Types
//!
//! - [`ConfigMapping`] / [`TrainingConfig`] - Caller configuration and its validated form
//! - [`RawColumn`] / [`DataSpec`] / [`VerticalDataset`] - Columnar data pipeline
//! - [`ModelHandle`] - Opaque reference to a registered model
//! - [`bridge`] - The train/predict/save/load/release surface
//!
//! # Typical Flow
//!
//! ```no_run
//! use treeline::{bridge, bridge::TrainData, ConfigMapping, RawColumn};
//!
//! let columns = vec![
//!     RawColumn::numeric("sepal_length", &[5.1, 7.0, 6.3]),
//!     RawColumn::text("species", &["setosa", "versicolor", "virginica"]),
//! ];
//! let mapping = ConfigMapping::new("random_forest", "classification", "species");
//! let handle = bridge::train(&mapping, TrainData::Columns(&columns))?;
//!
//! let features = vec![RawColumn::numeric("sepal_length", &[5.0])];
//! let scores = bridge::predict(handle, &features)?;
//! bridge::release(handle);
//! # Ok::<(), treeline::Error>(())
//! ```

pub mod bridge;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod handle;
pub mod model;
pub mod serving;

// =============================================================================
// Convenience Re-exports
// =============================================================================

// Bridge surface
pub use bridge::TrainData;
pub use handle::ModelHandle;

// Configuration types
pub use config::{ConfigMapping, LearnerKind, TaskKind, TrainingConfig};

// Data types (for preparing training data)
pub use data::{
    ColumnSpec, ColumnType, DataSpec, RawColumn, RawValue, SpecGuide, VerticalDataset,
};

// Model and serving types
pub use model::{ModelMeta, TrainedModel};
pub use serving::ServingEngine;

// Errors
pub use error::{
    ConfigError, DatasetError, Error, ModelFormatError, ResourceError, TrainError,
};
