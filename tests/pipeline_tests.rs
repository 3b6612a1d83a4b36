//! End-to-end tests for the dataset preparation pipeline

use chrono::{Duration, TimeZone, Utc};
use seismic_dataset::prelude::*;
use std::io::Write;
use tempfile::TempDir;

const SEQUENCE_LENGTH: usize = 10;

fn raw_records(count: usize) -> Vec<RawRecord> {
    let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| RawRecord {
            timestamp: Some((start + Duration::minutes(45 * i as i64)).timestamp_millis()),
            latitude: Some(20.0 + (i % 40) as f64 * 0.25),
            longitude: Some(120.0 + (i % 30) as f64 * 0.5),
            depth: Some((i % 25) as f64 * 4.0),
            magnitude: Some(if i % 3 == 0 { 0.0 } else { 1.5 + (i % 6) as f64 * 0.7 }),
        })
        .collect()
}

fn create_config(dir: &TempDir) -> PipelineConfig {
    let mut config = PipelineConfig::new()
        .with_sequence_length(SEQUENCE_LENGTH)
        .with_records_per_batch(60)
        .with_output_dir(dir.path().join("processed"))
        .with_feature_scaler_path(dir.path().join("scalers/feature_scaler.json"))
        .with_target_scaler_path(Some(dir.path().join("scalers/target_scalers.json")))
        .with_generator(GeneratorConfig::new(16).with_seed(1));
    config.split.validation_fraction = 0.25;
    config
}

fn build(pipeline: &Pipeline, records: Vec<RawRecord>) -> ChunkingReport {
    let (scaler, _) = pipeline
        .ensure_feature_scaler(&mut VecCursor::new(records.clone()))
        .unwrap();
    pipeline
        .build_chunks(&mut VecCursor::new(records), &scaler, None)
        .unwrap()
}

/// Predicts zero for every target.
struct ZeroModel;

impl SequenceModel for ZeroModel {
    fn predict(&self, inputs: &ndarray::Array3<f32>) -> Result<Predictions> {
        let zeros = ndarray::Array1::zeros(inputs.shape()[0]);
        Predictions::new(
            zeros.clone(),
            zeros.clone(),
            zeros.clone(),
            zeros.clone(),
            zeros,
        )
    }
}

#[test]
fn test_independent_chunking() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(create_config(&dir)).unwrap();
    let report = build(&pipeline, raw_records(200));

    // Batches of 60, 60, 60, 20 records; each loses L + 1 to windowing
    assert_eq!(report.batches_read, 4);
    assert_eq!(report.chunk_ids, vec![0, 1, 2, 3]);
    assert_eq!(report.sequences_written, 3 * 49 + 9);
    assert_eq!(report.batches_skipped, 0);
    assert_eq!(report.records_dropped(), 0);
    assert!(!report.cancelled);
    assert_eq!(report.occurrence.total, report.sequences_written);

    let dataset = ChunkedDataset::open(dir.path().join("processed")).unwrap();
    assert_eq!(dataset.len(), report.sequences_written);
}

#[test]
fn test_carried_overlap_loses_nothing_at_boundaries() {
    let dir = TempDir::new().unwrap();
    let mut config = create_config(&dir);
    config.chunks.carry_overlap = true;
    let pipeline = Pipeline::new(config).unwrap();

    let report = build(&pipeline, raw_records(200));
    assert_eq!(report.sequences_written, 200 - SEQUENCE_LENGTH - 1);
    assert_eq!(report.chunks_written(), 4);
}

#[test]
fn test_small_batches_are_skipped() {
    let dir = TempDir::new().unwrap();
    let config = create_config(&dir).with_records_per_batch(SEQUENCE_LENGTH + 2);
    let pipeline = Pipeline::new(config).unwrap();

    // 12 + 12 + 5 records: the last batch is too short for a window
    let report = build(&pipeline, raw_records(29));
    assert_eq!(report.batches_read, 3);
    assert_eq!(report.chunks_written(), 2);
    assert_eq!(report.batches_skipped, 1);
    assert_eq!(report.sequences_written, 2);
}

#[test]
fn test_dirty_records_are_counted() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(create_config(&dir)).unwrap();

    let mut records = raw_records(60);
    records[5].magnitude = None;
    records[9].latitude = Some(f64::NAN);
    records[20] = records[19].clone();

    let report = build(&pipeline, records);
    assert_eq!(report.cleaning.received, 60);
    assert_eq!(report.cleaning.invalid, 2);
    assert_eq!(report.cleaning.duplicates, 1);
    assert_eq!(report.records_dropped(), 3);
    assert_eq!(report.sequences_written, 57 - SEQUENCE_LENGTH - 1);
}

#[test]
fn test_max_chunks_and_cancellation() {
    let dir = TempDir::new().unwrap();
    let mut config = create_config(&dir);
    config.chunks.max_chunks = Some(2);
    let pipeline = Pipeline::new(config).unwrap();

    let report = build(&pipeline, raw_records(300));
    assert_eq!(report.chunks_written(), 2);
    assert_eq!(report.batches_read, 2);

    let token = CancellationToken::new();
    token.cancel();
    let scaler = MinMaxScaler::load_json(dir.path().join("scalers/feature_scaler.json")).unwrap();
    let report = pipeline
        .build_chunks(&mut VecCursor::new(raw_records(300)), &scaler, Some(&token))
        .unwrap();
    assert!(report.cancelled);
    assert_eq!(report.batches_read, 0);
    assert_eq!(pipeline.store().list_chunk_ids().unwrap(), vec![0, 1]);
}

#[test]
fn test_max_chunks_counts_skipped_batches() {
    let dir = TempDir::new().unwrap();
    let mut config = create_config(&dir).with_records_per_batch(SEQUENCE_LENGTH + 2);
    config.chunks.max_chunks = Some(3);
    let pipeline = Pipeline::new(config).unwrap();

    // The second batch of 12 loses two records to cleaning and yields no window
    let mut records = raw_records(40);
    records[13].magnitude = None;
    records[14].latitude = None;

    let report = build(&pipeline, records);
    assert_eq!(report.batches_read, 3);
    assert_eq!(report.batches_skipped, 1);
    assert_eq!(report.chunks_written(), 2);
    assert_eq!(report.cleaning.invalid, 2);
}

#[test]
fn test_prepare_end_to_end() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(create_config(&dir)).unwrap();

    let prepared = pipeline
        .prepare(
            VecCursor::new(raw_records(200)),
            VecCursor::new(raw_records(200)),
            None,
        )
        .unwrap();

    assert_eq!(prepared.scaler_origin, ScalerOrigin::Fitted);
    assert_eq!(prepared.split.train.len(), 3);
    assert_eq!(prepared.split.validation.len(), 1);
    assert!(dir.path().join("scalers/target_scalers.json").exists());
    let target_scalers = prepared.target_scalers.clone().unwrap();
    assert!(target_scalers.magnitude.is_some());

    let mut train = pipeline
        .train_generator(&prepared.split.train, Some(target_scalers.clone()))
        .unwrap();
    let batch = train.get_batch(0).unwrap();
    assert_eq!(batch.inputs.shape(), &[16, SEQUENCE_LENGTH, 4]);
    assert!(batch.inputs.iter().all(|v| (0.0..=1.0).contains(v)));
    train.on_epoch_end();

    let validation = pipeline
        .validation_generator(&prepared.split.validation, Some(target_scalers))
        .unwrap();
    assert!(!validation.config().shuffle);
    let total: usize = validation
        .iter_epoch(None)
        .map(|b| b.unwrap().len())
        .sum();
    assert_eq!(total, validation.n_sequences());

    let report = evaluate(&ZeroModel, &validation).unwrap();
    assert_eq!(report.n_sequences, validation.n_sequences());
    assert!(report.physical_units);
}

#[test]
fn test_rerun_reuses_scalers_and_appends_chunks() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(create_config(&dir)).unwrap();
    let first = pipeline
        .prepare(
            VecCursor::new(raw_records(120)),
            VecCursor::new(raw_records(120)),
            None,
        )
        .unwrap();

    let second = pipeline
        .prepare(
            VecCursor::new(raw_records(500)),
            VecCursor::new(raw_records(120)),
            None,
        )
        .unwrap();

    assert_eq!(second.scaler_origin, ScalerOrigin::Loaded);
    assert_eq!(second.feature_scaler, first.feature_scaler);
    assert_eq!(second.target_scalers, first.target_scalers);
    assert_eq!(second.report.chunk_ids, vec![2, 3]);
}

#[test]
fn test_in_memory_generator_with_balancing() {
    let dir = TempDir::new().unwrap();
    let config = create_config(&dir).with_balancing(true);
    let pipeline = Pipeline::new(config).unwrap();
    let report = build(&pipeline, raw_records(200));

    let generator = pipeline
        .in_memory_generator(&report.chunk_ids, None)
        .unwrap();
    let stats = generator.source().targets().occurrence_stats();
    assert_eq!(stats.occurred, stats.not_occurred);
    assert!(generator.n_sequences() > report.sequences_written);
}

#[test]
fn test_prepare_from_json_lines() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("events.jsonl");
    let mut file = std::fs::File::create(&input).unwrap();
    for raw in raw_records(80) {
        writeln!(
            file,
            r#"{{"timestamp": {}, "latitude": {}, "longitude": {}, "depth_km": {}, "mag": {}}}"#,
            raw.timestamp.unwrap(),
            raw.latitude.unwrap(),
            raw.longitude.unwrap(),
            raw.depth.unwrap(),
            raw.magnitude.unwrap()
        )
        .unwrap();
    }
    writeln!(file, "not json").unwrap();
    drop(file);

    let pipeline = Pipeline::new(create_config(&dir)).unwrap();
    let mut cursor = JsonLinesCursor::open(&input).unwrap();
    let prepared = pipeline
        .prepare(JsonLinesCursor::open(&input).unwrap(), &mut cursor, None)
        .unwrap();

    assert_eq!(cursor.malformed_lines(), 1);
    assert_eq!(prepared.report.cleaning.kept, 80);
    assert_eq!(prepared.report.sequences_written, 49 + 9);
}

#[test]
fn test_config_round_trip_through_toml() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dataset.toml");
    let config = create_config(&dir);
    config.save_toml(&path).unwrap();
    assert_eq!(PipelineConfig::load_toml(&path).unwrap(), config);

    let invalid = create_config(&dir).with_records_per_batch(SEQUENCE_LENGTH);
    assert!(matches!(
        Pipeline::new(invalid),
        Err(DatasetError::InvalidConfig(_))
    ));
}
