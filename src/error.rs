//! Error taxonomy for the bridge layer.
//!
//! Each component owns a focused error enum; [`Error`] is the top-level type
//! returned by the orchestrator entry points. Every entry point validates its
//! inputs before touching the engine and returns on the first violation, so
//! no partial handle or resource ever escapes a failed call.

use thiserror::Error;

/// Configuration resolution failures.
///
/// Produced by [`crate::config::TrainingConfig::resolve`] before any engine
/// interaction. Hyperparameter values are *not* validated here; that is the
/// engine's job (see [`TrainError`]).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Learner identifier not present in the registry.
    #[error("unknown learner '{0}'")]
    UnknownLearner(String),

    /// Task identifier not present in the registry.
    #[error("unknown task '{0}'")]
    UnknownTask(String),

    /// The label column name is required and must be non-empty.
    #[error("label column name must not be empty")]
    EmptyLabel,
}

/// Malformed or inconsistent input data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatasetError {
    /// No columns were supplied.
    #[error("column set is empty")]
    EmptyColumns,

    /// Columns disagree on row count.
    #[error("column '{column}' has {got} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        got: usize,
    },

    /// A column contains no usable (non-missing) values.
    #[error("column '{0}' has no usable values")]
    EmptyColumn(String),

    /// A column named by the specification is absent from the input.
    #[error("column '{0}' required by the data specification is missing")]
    MissingColumn(String),

    /// A value could not be coerced to the column's semantic type.
    #[error("column '{column}', row {row}: value does not parse as a number")]
    Coercion { column: String, row: usize },

    /// Dataset columns do not line up with the serving engine's features.
    #[error("feature '{feature}' mismatch: {detail}")]
    FeatureMismatch { feature: String, detail: String },
}

/// Invalid or foreign model handles.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceError {
    /// The handle does not refer to a live model in this process.
    #[error("handle {0} does not refer to a live model")]
    UnknownHandle(u64),
}

/// Failures reported by the training engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrainError {
    /// A hyperparameter name the engine does not know.
    #[error("unknown hyperparameter '{0}'")]
    UnknownHyperparameter(String),

    /// A hyperparameter value of the wrong type or out of range.
    #[error("hyperparameter '{name}': {detail}")]
    InvalidHyperparameter { name: String, detail: String },

    /// The learner cannot train this task / label combination.
    #[error("learner '{learner}' does not support {what}")]
    UnsupportedCombination { learner: String, what: String },

    /// A training row has no label value.
    #[error("label column '{label}' is missing a value at row {row}")]
    MissingLabel { label: String, row: usize },

    /// The label column's semantic type does not match the task.
    #[error("label column '{label}': {detail}")]
    LabelType { label: String, detail: String },
}

/// Model file encoding/decoding failures.
#[derive(Debug, Error)]
pub enum ModelFormatError {
    /// The file does not start with the expected magic bytes.
    #[error("not a treeline model file (bad magic)")]
    BadMagic,

    /// The format version is newer than this reader understands.
    #[error("unsupported model format version {0}")]
    UnsupportedVersion(u8),

    /// Payload (de)serialization failure.
    #[error("model payload: {0}")]
    Payload(String),
}

/// Top-level error for the orchestrator entry points.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Train(#[from] TrainError),

    #[error(transparent)]
    Model(#[from] ModelFormatError),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        let err = DatasetError::Coercion {
            column: "age".into(),
            row: 7,
        };
        let msg = err.to_string();
        assert!(msg.contains("age"));
        assert!(msg.contains('7'));
    }

    #[test]
    fn top_level_wraps_components() {
        let err: Error = ConfigError::EmptyLabel.into();
        assert!(matches!(err, Error::Config(ConfigError::EmptyLabel)));

        let err: Error = ResourceError::UnknownHandle(3).into();
        assert!(matches!(err, Error::Resource(_)));
    }
}
