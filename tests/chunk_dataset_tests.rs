//! Tests for chunk files, the chunk index, and chunk-backed batch generation

use chrono::{Duration, TimeZone, Utc};
use ndarray::Axis;
use seismic_dataset::prelude::*;
use seismic_dataset::ChunkIndex;
use std::fs;
use tempfile::TempDir;

const SEQUENCE_LENGTH: usize = 5;

fn create_records(offset: usize, count: usize) -> Vec<Record> {
    let start = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
    (offset..offset + count)
        .map(|i| {
            Record::new(
                start + Duration::minutes(30 * i as i64),
                (i % 90) as f64,
                (i % 180) as f64,
                (i % 60) as f64,
                if i % 4 == 0 { 0.0 } else { 1.0 + (i % 7) as f64 },
            )
        })
        .collect()
}

fn create_scaler() -> MinMaxScaler {
    MinMaxScaler::from_bounds(vec![0.0; 4], vec![90.0, 180.0, 60.0, 8.0]).unwrap()
}

/// Chunk directory holding chunks of the given sequence counts.
fn create_store(sequence_counts: &[usize]) -> (TempDir, ChunkStore) {
    let dir = TempDir::new().unwrap();
    let store = ChunkStore::create(dir.path()).unwrap();
    let windower = SequenceWindower::new(SEQUENCE_LENGTH).unwrap();
    let scaler = create_scaler();

    let mut offset = 0;
    for (id, &n) in sequence_counts.iter().enumerate() {
        let records = create_records(offset, n + SEQUENCE_LENGTH + 1);
        offset += records.len();
        let batch = windower.window(&records, &scaler).unwrap();
        assert_eq!(batch.len(), n);
        store.write_chunk(id as u32, &batch).unwrap();
    }
    (dir, store)
}

/// Sequence and magnitude target for a global index, read straight from the chunk.
fn direct_lookup(store: &ChunkStore, index: &ChunkIndex, global: usize) -> (Vec<f32>, f32) {
    let entry = index.resolve(global).unwrap();
    let chunk = store.read_chunk(entry.chunk_id).unwrap();
    let inputs = chunk
        .inputs
        .index_axis(Axis(0), entry.local_offset)
        .iter()
        .copied()
        .collect();
    (inputs, chunk.targets.magnitude[entry.local_offset])
}

#[test]
fn test_chunk_file_layout() {
    let (dir, store) = create_store(&[12]);

    assert!(dir.path().join("chunk_00000.npz").exists());
    assert!(dir.path().join("chunk_00000.json").exists());

    let metadata = store.read_metadata(0).unwrap().unwrap();
    assert_eq!(metadata.chunk_id, 0);
    assert_eq!(metadata.n_sequences, 12);
    assert_eq!(metadata.sequence_length, SEQUENCE_LENGTH);
    assert_eq!(metadata.n_features, 4);
    assert_eq!(metadata.occurrence.total, 12);

    let chunk = store.read_chunk(0).unwrap();
    assert_eq!(chunk.inputs.shape(), &[12, SEQUENCE_LENGTH, 4]);
    assert_eq!(chunk.targets.len(), 12);
}

#[test]
fn test_chunks_are_write_once() {
    let (_dir, store) = create_store(&[8]);
    let batch = SequenceWindower::new(SEQUENCE_LENGTH)
        .unwrap()
        .window(&create_records(1_000, 20), &create_scaler())
        .unwrap();

    assert!(store.write_chunk(0, &batch).is_err());
    assert_eq!(store.next_chunk_id().unwrap(), 1);
    assert!(store.write_chunk(1, &batch).unwrap().is_written());
    assert_eq!(store.list_chunk_ids().unwrap(), vec![0, 1]);
}

#[test]
fn test_empty_batch_is_skipped() {
    let dir = TempDir::new().unwrap();
    let store = ChunkStore::create(dir.path()).unwrap();
    let batch = SequenceWindower::new(SEQUENCE_LENGTH)
        .unwrap()
        .window(&create_records(0, 3), &create_scaler())
        .unwrap();

    let outcome = store.write_chunk(0, &batch).unwrap();
    assert!(!outcome.is_written());
    assert!(store.list_chunk_ids().unwrap().is_empty());
    assert!(matches!(
        ChunkedDataset::open(dir.path()),
        Err(DatasetError::EmptyDataset(_))
    ));
}

#[test]
fn test_index_over_uneven_chunks() {
    let (dir, store) = create_store(&[100, 150, 50]);
    let dataset = ChunkedDataset::open(dir.path()).unwrap();

    assert_eq!(dataset.len(), 300);
    assert_eq!(dataset.sequence_length(), SEQUENCE_LENGTH);
    let index = dataset.index();
    assert_eq!(index.chunk_ids(), &[0, 1, 2]);

    let entry = index.resolve(99).unwrap();
    assert_eq!((entry.chunk_id, entry.local_offset), (0, 99));
    let entry = index.resolve(100).unwrap();
    assert_eq!((entry.chunk_id, entry.local_offset), (1, 0));
    let entry = index.resolve(299).unwrap();
    assert_eq!((entry.chunk_id, entry.local_offset), (2, 49));
    assert!(index.resolve(300).is_none());

    // Index from the archives alone when sidecars are gone
    for id in 0..3 {
        fs::remove_file(store.metadata_path(id)).unwrap();
    }
    let rebuilt = ChunkIndex::build(&store, &[0, 1, 2]).unwrap();
    assert_eq!(rebuilt.len(), 300);
    assert_eq!(rebuilt.chunk_len(1), Some(150));
}

#[test]
fn test_first_unshuffled_batch_comes_from_first_chunk() {
    let (dir, store) = create_store(&[100, 150, 50]);
    let dataset = ChunkedDataset::open(dir.path()).unwrap();
    let generator =
        BatchGenerator::new(dataset, GeneratorConfig::new(64).with_shuffle(false)).unwrap();

    assert_eq!(generator.len(), 5);
    assert_eq!(generator.batch_indices(0).unwrap(), (0..64).collect::<Vec<_>>());

    let batch = generator.get_batch(0).unwrap();
    let chunk = store.read_chunk(0).unwrap();
    let expected = chunk.select(&(0..64).collect::<Vec<_>>());
    assert_eq!(batch.inputs, expected.inputs);
    assert_eq!(batch.targets, expected.targets);

    // Last batch is short, never padded
    assert_eq!(generator.get_batch(4).unwrap().len(), 300 - 4 * 64);
    assert!(matches!(
        generator.get_batch(5),
        Err(DatasetError::BatchOutOfRange { index: 5, total: 5 })
    ));
}

#[test]
fn test_shuffled_batches_match_direct_lookup() {
    let (dir, store) = create_store(&[40, 25, 35]);
    let dataset = ChunkedDataset::open(dir.path()).unwrap();
    let index = dataset.index().clone();
    let generator = BatchGenerator::new(dataset, GeneratorConfig::new(16).with_seed(7)).unwrap();

    let mut seen = Vec::new();
    for b in 0..generator.len() {
        let indices = generator.batch_indices(b).unwrap().to_vec();
        let batch = generator.get_batch(b).unwrap();
        assert_eq!(batch.len(), indices.len());

        for (row, &global) in indices.iter().enumerate() {
            let (inputs, magnitude) = direct_lookup(&store, &index, global);
            let got: Vec<f32> = batch.inputs.index_axis(Axis(0), row).iter().copied().collect();
            assert_eq!(got, inputs);
            assert_eq!(batch.targets.magnitude[row], magnitude);
        }
        seen.extend(indices);
    }

    seen.sort_unstable();
    assert_eq!(seen, (0..100).collect::<Vec<_>>());
}

#[test]
fn test_parallel_reads_match_sequential() {
    let (dir, _store) = create_store(&[30, 30, 30, 30]);
    let config = GeneratorConfig::new(32).with_seed(3);

    let sequential = BatchGenerator::new(ChunkedDataset::open(dir.path()).unwrap(), config.clone())
        .unwrap();
    let parallel = BatchGenerator::new(
        ChunkedDataset::open(dir.path())
            .unwrap()
            .with_parallel_reads(true),
        config.with_parallel_reads(true),
    )
    .unwrap();

    for b in 0..sequential.len() {
        let a = sequential.get_batch(b).unwrap();
        let p = parallel.get_batch(b).unwrap();
        assert_eq!(a.inputs, p.inputs);
        assert_eq!(a.targets, p.targets);
    }
}

#[test]
fn test_missing_chunk_fails_only_its_batches() {
    let (dir, store) = create_store(&[20, 20]);
    let dataset = ChunkedDataset::open(dir.path()).unwrap();
    let generator =
        BatchGenerator::new(dataset, GeneratorConfig::new(10).with_shuffle(false)).unwrap();

    fs::remove_file(store.chunk_path(1)).unwrap();

    assert!(generator.get_batch(0).is_ok());
    assert!(generator.get_batch(1).is_ok());
    assert!(matches!(
        generator.get_batch(2),
        Err(DatasetError::ChunkUnreadable { .. })
    ));
    assert!(matches!(
        generator.get_batch(3),
        Err(DatasetError::ChunkUnreadable { .. })
    ));
    // Still usable afterwards
    assert_eq!(generator.get_batch(0).unwrap().len(), 10);
}

#[test]
fn test_corrupt_chunk_is_unreadable() {
    let (_dir, store) = create_store(&[10]);
    fs::write(store.chunk_path(0), b"not a zip archive").unwrap();
    assert!(matches!(
        store.read_chunk(0),
        Err(DatasetError::ChunkUnreadable { .. })
    ));
}

#[test]
fn test_in_memory_matches_chunked() {
    let (dir, store) = create_store(&[15, 20]);
    let config = GeneratorConfig::new(8).with_seed(11);

    let chunked =
        BatchGenerator::new(ChunkedDataset::open(dir.path()).unwrap(), config.clone()).unwrap();
    let in_memory = BatchGenerator::new(
        InMemoryDataset::load_chunks(&store, &[0, 1]).unwrap(),
        config,
    )
    .unwrap();

    assert_eq!(chunked.len(), in_memory.len());
    for b in 0..chunked.len() {
        assert_eq!(chunked.get_batch(b).unwrap().inputs, in_memory.get_batch(b).unwrap().inputs);
    }
}
