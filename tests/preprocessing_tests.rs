//! Tests for scalers, class balancing, and generator determinism

use chrono::{Duration, TimeZone, Utc};
use ndarray::{array, Array1, Array3};
use seismic_dataset::prelude::*;
use std::fs;
use tempfile::TempDir;

fn raw_records(count: usize) -> Vec<RawRecord> {
    let start = Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| RawRecord {
            timestamp: Some((start + Duration::hours(i as i64)).timestamp_millis()),
            latitude: Some(-10.0 + i as f64 * 0.5),
            longitude: Some(100.0 + (i % 13) as f64),
            depth: Some(5.0 + (i % 11) as f64 * 3.0),
            magnitude: Some(if i % 5 == 0 { 0.0 } else { 2.5 + (i % 4) as f64 * 0.5 }),
        })
        .collect()
}

fn in_memory(labels: &[u8]) -> InMemoryDataset {
    let n = labels.len();
    let inputs = Array3::from_shape_fn((n, 4, 4), |(i, t, f)| (i * 100 + t * 10 + f) as f32);
    let key = Array1::from_iter((0..n).map(|i| i as f32));
    let targets = TargetArrays::new(
        Array1::from(labels.to_vec()),
        key.clone(),
        key.clone(),
        key.clone(),
        key,
    )
    .unwrap();
    InMemoryDataset::new(Batch { inputs, targets }).unwrap()
}

#[test]
fn test_min_max_round_trip() {
    let samples = array![[0.0, 10.0, 5.0, 1.0], [4.0, 30.0, 25.0, 7.0], [2.0, 20.0, 15.0, 4.0]];
    let scaler = MinMaxScaler::fit(samples.view()).unwrap();

    let scaled = scaler.transform(samples.view()).unwrap();
    assert_eq!(scaled.row(0).to_vec(), vec![0.0; 4]);
    assert_eq!(scaled.row(1).to_vec(), vec![1.0; 4]);

    let restored = scaler.inverse_transform(scaled.view()).unwrap();
    for (a, b) in restored.iter().zip(samples.iter()) {
        assert!((a - b).abs() < 1e-9);
    }
}

#[test]
fn test_scaler_persistence_is_exact() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scalers/feature_scaler.json");

    let scaler = MinMaxScaler::from_bounds(
        vec![-33.123456789012345, 0.1, 0.0, 1.0 / 3.0],
        vec![45.987654321, 179.99999999, 700.5, 9.1],
    )
    .unwrap();
    scaler.save_json(&path).unwrap();
    let loaded = MinMaxScaler::load_json(&path).unwrap();

    assert_eq!(loaded, scaler);
    let row = [12.345678901, 90.0, 33.3, 5.5];
    let a = scaler.transform_row(&row).unwrap();
    let b = loaded.transform_row(&row).unwrap();
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.to_bits(), y.to_bits());
    }
}

#[test]
fn test_ensure_feature_scaler_fits_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("feature_scaler.json");

    let (fitted, origin) =
        ensure_feature_scaler(&path, &mut VecCursor::new(raw_records(50)), 16, true).unwrap();
    assert_eq!(origin, ScalerOrigin::Fitted);
    assert!(path.exists());
    assert_eq!(fitted.data_min()[0], -10.0);
    assert_eq!(fitted.data_max()[0], -10.0 + 49.0 * 0.5);

    // A second call never refits, even with different data
    let (loaded, origin) =
        ensure_feature_scaler(&path, &mut VecCursor::new(raw_records(5)), 16, true).unwrap();
    assert_eq!(origin, ScalerOrigin::Loaded);
    assert_eq!(loaded, fitted);
}

#[test]
fn test_ensure_feature_scaler_missing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.json");
    let err = ensure_feature_scaler(&path, &mut VecCursor::new(raw_records(10)), 4, false)
        .unwrap_err();
    assert!(matches!(err, DatasetError::ScalerMissing { .. }));
    assert!(!path.exists());
}

#[test]
fn test_target_scalers_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("target_scalers.json");

    let mut fit = seismic_dataset::preprocessing::TargetScalersFit::new();
    let col = array![1.0f32, 2.0, 3.0, 4.0];
    let targets = TargetArrays::new(
        array![0u8, 1, 1, 0],
        col.clone(),
        col.mapv(|v| v * 10.0),
        col.clone(),
        col,
    )
    .unwrap();
    fit.update(&targets).unwrap();
    let scalers = fit.finish().unwrap();
    scalers.save_json(&path).unwrap();
    let loaded = TargetScalers::load_json(&path).unwrap();
    assert_eq!(loaded, scalers);

    // Latitude targets span 10..40
    let scaled = loaded.transform_value(TargetKind::Latitude, 25.0);
    assert!((scaled - 0.5).abs() < 1e-9);
    let restored = loaded.inverse_transform_value(TargetKind::Latitude, scaled);
    assert!((restored - 25.0).abs() < 1e-9);
    assert_eq!(loaded.transform_value(TargetKind::Occurrence, 1.0), 1.0);
    assert!((loaded.transform_value(TargetKind::Magnitude, 4.0) - 1.0).abs() < 1e-9);
}

#[test]
fn test_truncated_target_scaler_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("target_scalers.json");
    fs::write(&path, r#"{"magnitude": {"data_min": [], "data_max": []"#).unwrap();
    assert!(TargetScalers::load_json(&path).is_err());

    fs::write(
        &path,
        r#"{"magnitude": {"data_min": [], "data_max": [], "feature_range": [0.0, 1.0]}}"#,
    )
    .unwrap();
    assert!(TargetScalers::load_json(&path).is_err());
}

#[test]
fn test_corrupt_scaler_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("feature_scaler.json");
    fs::write(&path, "{ not json").unwrap();
    assert!(MinMaxScaler::load_json(&path).is_err());
}

#[test]
fn test_single_class_dataset_is_not_balanced() {
    let dataset = in_memory(&[0; 500]);
    let (balanced, result) = dataset.balanced(&ClassBalancer::new(42)).unwrap();
    assert!(!result.applied);
    assert_eq!(balanced.len(), 500);
    assert_eq!(balanced.targets(), dataset.targets());
}

#[test]
fn test_balancing_equalises_classes() {
    let mut labels = vec![0u8; 90];
    labels.extend([1u8; 10]);
    let dataset = in_memory(&labels);

    let (balanced, result) = dataset.balanced(&ClassBalancer::new(5)).unwrap();
    assert!(result.applied);
    assert_eq!(result.after.occurred, 90);
    assert_eq!(result.after.not_occurred, 90);
    assert_eq!(balanced.len(), 180);

    // Every balanced row is a copy of an original row
    for (row, &source) in result.indices.iter().enumerate() {
        assert_eq!(balanced.targets().magnitude[row], source as f32);
        assert_eq!(balanced.targets().occurrence[row], labels[source]);
    }

    let (again, _) = dataset.balanced(&ClassBalancer::new(5)).unwrap();
    assert_eq!(again.targets(), balanced.targets());
}

#[test]
fn test_generator_is_deterministic_per_seed() {
    let labels: Vec<u8> = (0..103).map(|i| (i % 3 == 0) as u8).collect();
    let config = GeneratorConfig::new(10).with_seed(99);

    let mut a = BatchGenerator::new(in_memory(&labels), config.clone()).unwrap();
    let mut b = BatchGenerator::new(in_memory(&labels), config).unwrap();

    for _ in 0..3 {
        for i in 0..a.len() {
            assert_eq!(a.get_batch(i).unwrap().inputs, b.get_batch(i).unwrap().inputs);
        }
        a.on_epoch_end();
        b.on_epoch_end();
    }
    assert_eq!(a.epoch(), 3);
}

#[test]
fn test_epochs_reshuffle_and_cover_everything() {
    let labels = vec![0u8; 64];
    let mut generator = BatchGenerator::new(in_memory(&labels), GeneratorConfig::new(8)).unwrap();

    let first = generator.order().to_vec();
    generator.on_epoch_end();
    let second = generator.order().to_vec();
    assert_ne!(first, second);

    let mut sorted = second;
    sorted.sort_unstable();
    assert_eq!(sorted, (0..64).collect::<Vec<_>>());
}

#[test]
fn test_drop_partial_rounding() {
    let labels = vec![0u8; 70];
    let config = GeneratorConfig::new(32)
        .with_shuffle(false)
        .with_rounding(BatchRounding::DropPartial);
    let generator = BatchGenerator::new(in_memory(&labels), config).unwrap();
    assert_eq!(generator.len(), 2);
    assert!(generator.get_batch(2).is_err());

    let too_small = BatchGenerator::new(
        in_memory(&[0; 10]),
        GeneratorConfig::new(32).with_rounding(BatchRounding::DropPartial),
    );
    assert!(matches!(too_small, Err(DatasetError::EmptyDataset(_))));
}

#[test]
fn test_target_scalers_applied_to_batches() {
    let labels = vec![1u8, 0, 1, 0];
    let scalers = TargetScalers {
        magnitude: Some(MinMaxScaler::from_bounds(vec![1.5], vec![2.0]).unwrap()),
        ..Default::default()
    };
    let generator = BatchGenerator::new(in_memory(&labels), GeneratorConfig::new(4).with_shuffle(false))
        .unwrap()
        .with_target_scalers(scalers);

    let batch = generator.get_batch(0).unwrap();
    assert_eq!(batch.targets.magnitude.to_vec(), vec![-3.0, -1.0, 1.0, 3.0]);
    assert_eq!(batch.targets.latitude.to_vec(), vec![0.0, 1.0, 2.0, 3.0]);
    assert_eq!(batch.targets.occurrence.to_vec(), labels);
}
