//! End-to-end tests over the bridge surface: train, predict, save, load,
//! release, and the failure paths in between.

use std::io::Write;

use treeline::bridge::{self, TrainData};
use treeline::{
    handle, ConfigMapping, ConfigError, DatasetError, Error, RawColumn, RawValue, TrainError,
};

fn separable_columns() -> Vec<RawColumn> {
    vec![
        RawColumn::numeric("x", &[1.0, 2.0, 8.0, 9.0]),
        RawColumn::text("y", &["a", "a", "b", "b"]),
    ]
}

fn features(xs: &[f64]) -> Vec<RawColumn> {
    vec![RawColumn::numeric("x", xs)]
}

// =============================================================================
// Training and prediction
// =============================================================================

#[test]
fn separable_classifier_end_to_end() {
    let mapping = ConfigMapping::new("random_forest", "classification", "y");
    let handle = bridge::train(&mapping, TrainData::Columns(&separable_columns())).unwrap();

    let scores = bridge::predict(handle, &features(&[1.5, 8.5])).unwrap();
    assert_eq!(scores.len(), 2);
    for &s in &scores {
        assert!((0.0..=1.0).contains(&s), "score {s} out of [0, 1]");
    }
    // Rows from the two clusters land on opposite sides of 0.5.
    assert!(scores[0] < 0.5);
    assert!(scores[1] > 0.5);

    assert!(bridge::release(handle));
}

#[test]
fn prediction_row_count_matches_input() {
    let mapping = ConfigMapping::new("cart", "classification", "y");
    let handle = bridge::train(&mapping, TrainData::Columns(&separable_columns())).unwrap();

    for n in [0usize, 1, 7, 100] {
        let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let scores = bridge::predict(handle, &features(&xs)).unwrap();
        assert_eq!(scores.len(), n);
    }
    bridge::release(handle);
}

#[test]
fn training_is_deterministic() {
    let mapping = ConfigMapping::new("random_forest", "classification", "y")
        .with_option("num_trees", 20)
        .with_option("seed", 7);

    let a = bridge::train(&mapping, TrainData::Columns(&separable_columns())).unwrap();
    let b = bridge::train(&mapping, TrainData::Columns(&separable_columns())).unwrap();

    let batch = features(&[0.0, 3.0, 5.0, 7.0, 10.0]);
    assert_eq!(
        bridge::predict(a, &batch).unwrap(),
        bridge::predict(b, &batch).unwrap()
    );
    bridge::release(a);
    bridge::release(b);
}

#[test]
fn gbt_regression_fits_the_mean_structure() {
    let columns = vec![
        RawColumn::numeric("x", &[1.0, 2.0, 8.0, 9.0]),
        RawColumn::numeric("price", &[10.0, 11.0, 30.0, 31.0]),
    ];
    let mapping = ConfigMapping::new("gradient_boosted_trees", "regression", "price")
        .with_option("num_trees", 50);
    let handle = bridge::train(&mapping, TrainData::Columns(&columns)).unwrap();

    let scores = bridge::predict(handle, &features(&[1.5, 8.5])).unwrap();
    assert!(scores[0] < 20.0, "low cluster predicted {}", scores[0]);
    assert!(scores[1] > 20.0, "high cluster predicted {}", scores[1]);
    bridge::release(handle);
}

#[test]
fn out_of_vocabulary_category_still_scores() {
    let columns = vec![
        RawColumn::text("color", &["red", "red", "blue", "blue"]),
        RawColumn::text("y", &["a", "a", "b", "b"]),
    ];
    let mapping = ConfigMapping::new("cart", "classification", "y");
    let handle = bridge::train(&mapping, TrainData::Columns(&columns)).unwrap();

    // "green" was never seen in training; it must map to the sentinel code
    // and follow the split's missing direction rather than fail.
    let batch = vec![RawColumn::text("color", &["green"])];
    let scores = bridge::predict(handle, &batch).unwrap();
    assert_eq!(scores.len(), 1);
    assert!((0.0..=1.0).contains(&scores[0]));
    bridge::release(handle);
}

#[test]
fn missing_numeric_values_are_tolerated() {
    let mapping = ConfigMapping::new("cart", "classification", "y");
    let handle = bridge::train(&mapping, TrainData::Columns(&separable_columns())).unwrap();

    let batch = vec![RawColumn::new(
        "x",
        vec![RawValue::Null, RawValue::Number(5.0)],
    )];
    let scores = bridge::predict(handle, &batch).unwrap();
    assert_eq!(scores.len(), 2);
    bridge::release(handle);
}

// =============================================================================
// CSV input
// =============================================================================

#[test]
fn trains_from_csv_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "x,y").unwrap();
    for (x, y) in [(1.0, "a"), (2.0, "a"), (8.0, "b"), (9.0, "b")] {
        writeln!(file, "{x},{y}").unwrap();
    }
    file.flush().unwrap();

    let mapping = ConfigMapping::new("cart", "classification", "y");
    let handle = bridge::train(&mapping, TrainData::File(file.path())).unwrap();

    let scores = bridge::predict(handle, &features(&[1.0, 9.0])).unwrap();
    assert!(scores[0] < 0.5 && scores[1] > 0.5);
    bridge::release(handle);
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn save_load_preserves_predictions_and_spec() {
    let mapping = ConfigMapping::new("random_forest", "classification", "y");
    let original = bridge::train(&mapping, TrainData::Columns(&separable_columns())).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.trln");
    bridge::save(original, &path).unwrap();
    let reloaded = bridge::load(&path).unwrap();
    assert_ne!(original, reloaded);

    let original_model = handle::resolve(original).unwrap();
    let reloaded_model = handle::resolve(reloaded).unwrap();
    assert_eq!(original_model.spec(), reloaded_model.spec());
    assert_eq!(original_model.meta(), reloaded_model.meta());

    let batch = features(&[0.5, 4.5, 9.5]);
    assert_eq!(
        bridge::predict(original, &batch).unwrap(),
        bridge::predict(reloaded, &batch).unwrap()
    );

    bridge::release(original);
    bridge::release(reloaded);
}

#[test]
fn load_rejects_foreign_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.bin");
    std::fs::write(&path, b"definitely not a model").unwrap();

    let err = bridge::load(&path).unwrap_err();
    assert!(matches!(err, Error::Model(_)));
}

// =============================================================================
// Failure paths
// =============================================================================

#[test]
fn unknown_learner_and_task_rejected_before_data() {
    // Columns are malformed too; config validation must win.
    let columns = vec![RawColumn::numeric("x", &[])];

    let err = bridge::train(
        &ConfigMapping::new("svm", "classification", "y"),
        TrainData::Columns(&columns),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::UnknownLearner(_))));

    let err = bridge::train(
        &ConfigMapping::new("cart", "clustering", "y"),
        TrainData::Columns(&columns),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::UnknownTask(_))));

    let err = bridge::train(
        &ConfigMapping::new("cart", "classification", ""),
        TrainData::Columns(&columns),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::EmptyLabel)));
}

#[test]
fn ragged_columns_rejected() {
    let columns = vec![
        RawColumn::numeric("x", &[1.0, 2.0, 3.0]),
        RawColumn::text("y", &["a", "b"]),
    ];
    let err = bridge::train(
        &ConfigMapping::new("cart", "classification", "y"),
        TrainData::Columns(&columns),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        Error::Dataset(DatasetError::LengthMismatch {
            expected: 3,
            got: 2,
            ..
        })
    ));
}

#[test]
fn unknown_hyperparameter_rejected() {
    let mapping =
        ConfigMapping::new("cart", "classification", "y").with_option("n_tres", 30);
    let err = bridge::train(&mapping, TrainData::Columns(&separable_columns())).unwrap_err();
    assert!(matches!(
        err,
        Error::Train(TrainError::UnknownHyperparameter(_))
    ));
}

#[test]
fn ranking_is_registered_but_unsupported() {
    let mapping = ConfigMapping::new("gradient_boosted_trees", "ranking", "y");
    let err = bridge::train(&mapping, TrainData::Columns(&separable_columns())).unwrap_err();
    assert!(matches!(
        err,
        Error::Train(TrainError::UnsupportedCombination { .. })
    ));
}

#[test]
fn missing_label_column_rejected() {
    let columns = vec![RawColumn::numeric("x", &[1.0, 2.0])];
    let err = bridge::train(
        &ConfigMapping::new("cart", "regression", "price"),
        TrainData::Columns(&columns),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        Error::Dataset(DatasetError::MissingColumn(_))
    ));
}

// =============================================================================
// Handle lifecycle
// =============================================================================

#[test]
fn handles_are_isolated_and_release_is_idempotent() {
    let class_mapping = ConfigMapping::new("cart", "classification", "y");
    let a = bridge::train(&class_mapping, TrainData::Columns(&separable_columns())).unwrap();
    let b = bridge::train(&class_mapping, TrainData::Columns(&separable_columns())).unwrap();
    assert_ne!(a, b);

    assert!(bridge::release(a));
    assert!(!bridge::release(a));

    // b is untouched by a's release.
    let scores = bridge::predict(b, &features(&[5.0])).unwrap();
    assert_eq!(scores.len(), 1);
    assert!(bridge::release(b));

    let err = bridge::predict(a, &features(&[5.0])).unwrap_err();
    assert!(matches!(err, Error::Resource(_)));
}
