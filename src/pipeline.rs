//! Dataset preparation pipeline.
//!
//! Connects every stage from the record cursor to ready-to-train batch
//! generators:
//!
//! ```text
//! RecordCursor ──► ensure_feature_scaler ──► MinMaxScaler (fit once, persisted)
//!      │
//!      ▼
//! clean_records ──► SequenceWindower / StreamingWindower ──► ChunkStore
//!                                                              │
//!                         split_chunks (train / validation) ◄──┘
//!                                │
//!        fit TargetScalers on train chunks (persisted)
//!                                │
//!                                ▼
//!        ChunkedDataset / InMemoryDataset ──► BatchGenerator
//! ```
//!
//! # Philosophy
//! - **Explicit initialisation**: scalers are fitted or loaded once, up
//!   front, never inside the windowing loop
//! - **Write-once storage**: chunks are appended, never rewritten
//! - **Cancellable**: chunk building stops between batches and leaves only
//!   complete chunks behind
//!
//! # Example
//!
//! ```ignore
//! use seismic_dataset::prelude::*;
//!
//! let pipeline = Pipeline::new(PipelineConfig::load_toml("dataset.toml")?)?;
//! let prepared = pipeline.prepare(
//!     JsonLinesCursor::open("events.jsonl")?,
//!     JsonLinesCursor::open("events.jsonl")?,
//!     None,
//! )?;
//!
//! let mut train = pipeline.train_generator(&prepared.split.train, prepared.target_scalers.clone())?;
//! for epoch in 0..10 {
//!     for batch in train.iter_epoch(None) {
//!         model.train_on_batch(batch?);
//!     }
//!     train.on_epoch_end();
//! }
//! ```

use crate::config::{GeneratorConfig, PipelineConfig};
use crate::dataset::{ChunkedDataset, InMemoryDataset};
use crate::error::{DatasetError, Result};
use crate::export::{ChunkStore, ChunkWriteOutcome};
use crate::generator::{BatchGenerator, CancellationToken};
use crate::labeling::OccurrenceStats;
use crate::preprocessing::{
    ensure_feature_scaler, ClassBalancer, MinMaxScaler, ScalerOrigin, TargetScalers,
    TargetScalersFit,
};
use crate::record::{clean_records, CleaningStats, Record, RecordCursor};
use crate::sequence_builder::{SequenceWindower, StreamingWindower, WindowedBatch};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Counters from one [`Pipeline::build_chunks`] run.
#[derive(Debug, Clone, Default)]
pub struct ChunkingReport {
    /// Cursor batches pulled
    pub batches_read: usize,
    /// Chunks written, in write order
    pub chunk_ids: Vec<u32>,
    /// Batches that produced no sequences
    pub batches_skipped: usize,
    pub sequences_written: usize,
    /// Candidate windows dropped for non-finite values
    pub skipped_windows: usize,
    /// Record cleaning totals across all batches
    pub cleaning: CleaningStats,
    /// Records dropped because they did not continue the carried tail
    pub boundary_duplicates: usize,
    /// Occurrence counts over all written sequences
    pub occurrence: OccurrenceStats,
    /// Stopped early by the cancellation token
    pub cancelled: bool,
}

impl ChunkingReport {
    pub fn chunks_written(&self) -> usize {
        self.chunk_ids.len()
    }

    /// Records lost to cleaning or batch-boundary de-duplication.
    pub fn records_dropped(&self) -> usize {
        self.cleaning.dropped() + self.boundary_duplicates
    }
}

/// Chunk ids assigned to training and validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetSplit {
    pub train: Vec<u32>,
    pub validation: Vec<u32>,
}

/// Result of [`Pipeline::prepare`].
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    pub feature_scaler: MinMaxScaler,
    pub scaler_origin: ScalerOrigin,
    pub report: ChunkingReport,
    pub split: DatasetSplit,
    /// Present when a target scaler path is configured
    pub target_scalers: Option<TargetScalers>,
}

/// Hold out `ceil(n * validation_fraction)` chunks for validation.
///
/// The assignment depends only on the ids and the seed. At least one chunk
/// always stays in training. Both lists come back sorted.
pub fn split_chunks(chunk_ids: &[u32], validation_fraction: f64, seed: u64) -> DatasetSplit {
    let n = chunk_ids.len();
    if n == 0 {
        return DatasetSplit::default();
    }

    let wanted = (n as f64 * validation_fraction.max(0.0)).ceil() as usize;
    let n_validation = wanted.min(n - 1);

    let mut shuffled = chunk_ids.to_vec();
    shuffled.sort_unstable();
    shuffled.shuffle(&mut StdRng::seed_from_u64(seed));

    let mut validation = shuffled[..n_validation].to_vec();
    let mut train = shuffled[n_validation..].to_vec();
    validation.sort_unstable();
    train.sort_unstable();
    DatasetSplit { train, validation }
}

/// Orchestrates scaler initialisation, chunk building, and generator setup.
pub struct Pipeline {
    config: PipelineConfig,
    windower: SequenceWindower,
    store: ChunkStore,
}

impl Pipeline {
    /// Validate `config` and open (or create) the chunk directory.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate().map_err(DatasetError::InvalidConfig)?;
        let windower = SequenceWindower::new(config.window.sequence_length)?;
        let store = ChunkStore::create(&config.chunks.output_dir)?;
        Ok(Self {
            config,
            windower,
            store,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn windower(&self) -> &SequenceWindower {
        &self.windower
    }

    /// Load the configured feature scaler, or fit it from `fit_cursor`.
    pub fn ensure_feature_scaler<C: RecordCursor>(
        &self,
        fit_cursor: &mut C,
    ) -> Result<(MinMaxScaler, ScalerOrigin)> {
        ensure_feature_scaler(
            &self.config.scalers.feature_scaler_path,
            fit_cursor,
            self.config.chunks.records_per_batch,
            self.config.scalers.fit_if_missing,
        )
    }

    /// Drain `cursor` into chunks, one chunk per non-empty cursor batch.
    ///
    /// New chunks get ids after any already in the directory. Cancellation
    /// and `max_chunks` are checked before each cursor batch.
    pub fn build_chunks<C: RecordCursor>(
        &self,
        cursor: &mut C,
        scaler: &MinMaxScaler,
        token: Option<&CancellationToken>,
    ) -> Result<ChunkingReport> {
        let chunks = &self.config.chunks;
        let mut report = ChunkingReport::default();
        let mut next_id = self.store.next_chunk_id()?;
        if next_id > 0 {
            log::info!(
                "{} already holds chunks, new chunks start at id {next_id}",
                self.store.dir().display()
            );
        }

        let mut streaming = chunks.carry_overlap.then(|| {
            let s = StreamingWindower::new(self.windower);
            match self.config.window.max_gap_seconds {
                Some(gap) => s.with_max_gap_seconds(gap),
                None => s,
            }
        });

        loop {
            if token.is_some_and(|t| t.is_cancelled()) {
                log::warn!(
                    "Chunk building cancelled after {} batches",
                    report.batches_read
                );
                report.cancelled = true;
                break;
            }
            if chunks
                .max_chunks
                .is_some_and(|max| report.batches_read >= max)
            {
                log::info!("Read max_chunks cursor batches, stopping");
                break;
            }

            let raw = cursor.next_batch(chunks.records_per_batch)?;
            if raw.is_empty() {
                break;
            }
            report.batches_read += 1;

            let (records, stats) = clean_records(raw);
            report.cleaning.merge(&stats);

            let batch = match streaming.as_mut() {
                Some(s) => self.window_streaming(s, records, scaler, &mut report)?,
                None => self.windower.window(&records, scaler)?,
            };
            report.skipped_windows += batch.skipped_windows;

            match self.store.write_chunk(next_id, &batch)? {
                ChunkWriteOutcome::Written {
                    chunk_id,
                    n_sequences,
                    ..
                } => {
                    report.chunk_ids.push(chunk_id);
                    report.sequences_written += n_sequences;
                    report.occurrence.merge(&batch.occurrence_stats());
                    next_id += 1;
                }
                ChunkWriteOutcome::Skipped { .. } => report.batches_skipped += 1,
            }
        }

        log::info!(
            "Chunking done: {} batches, {} chunks, {} skipped, {} sequences, {} records dropped",
            report.batches_read,
            report.chunks_written(),
            report.batches_skipped,
            report.sequences_written,
            report.records_dropped()
        );
        Ok(report)
    }

    fn window_streaming(
        &self,
        streaming: &mut StreamingWindower,
        mut records: Vec<Record>,
        scaler: &MinMaxScaler,
        report: &mut ChunkingReport,
    ) -> Result<WindowedBatch> {
        if let Some(last) = streaming.last_time() {
            let before = records.len();
            records.retain(|r| r.time > last);
            report.boundary_duplicates += before - records.len();
        }

        match streaming.push(&records, scaler) {
            Err(DatasetError::DiscontinuousBatch(reason)) => {
                log::warn!("Windowing batch independently: {reason}");
                streaming.reset();
                streaming.push(&records, scaler)
            }
            other => other,
        }
    }

    /// All chunk ids split into training and validation.
    pub fn split(&self) -> Result<DatasetSplit> {
        let ids = self.store.list_chunk_ids()?;
        let split = split_chunks(
            &ids,
            self.config.split.validation_fraction,
            self.config.split.seed,
        );
        log::info!(
            "Split {} chunks: {} train, {} validation",
            ids.len(),
            split.train.len(),
            split.validation.len()
        );
        Ok(split)
    }

    /// Fit per-target scalers over the target arrays of `train_ids`.
    ///
    /// Only the target arrays are streamed; input tensors are never loaded.
    /// The result is persisted when a target scaler path is configured.
    pub fn fit_target_scalers(&self, train_ids: &[u32]) -> Result<TargetScalers> {
        let mut fit = TargetScalersFit::new();
        for &id in train_ids {
            fit.update(&self.store.read_targets(id)?)?;
        }
        log::info!(
            "Fitting target scalers on {} sequences from {} chunks",
            fit.count(),
            train_ids.len()
        );
        let scalers = fit.finish()?;
        if let Some(path) = &self.config.scalers.target_scaler_path {
            scalers.save_json(path)?;
        }
        Ok(scalers)
    }

    /// Load persisted target scalers or fit them on `train_ids`.
    ///
    /// `None` when no target scaler path is configured.
    pub fn ensure_target_scalers(&self, train_ids: &[u32]) -> Result<Option<TargetScalers>> {
        let Some(path) = &self.config.scalers.target_scaler_path else {
            return Ok(None);
        };
        if path.exists() {
            log::info!("Loading target scalers from {}", path.display());
            return TargetScalers::load_json(path).map(Some);
        }
        if !self.config.scalers.fit_if_missing {
            return Err(DatasetError::ScalerMissing { path: path.clone() });
        }
        self.fit_target_scalers(train_ids).map(Some)
    }

    /// Full run: ensure the feature scaler, build chunks, split, and
    /// ensure target scalers.
    pub fn prepare<F: RecordCursor, B: RecordCursor>(
        &self,
        mut fit_cursor: F,
        mut build_cursor: B,
        token: Option<&CancellationToken>,
    ) -> Result<PreparedDataset> {
        let (feature_scaler, scaler_origin) = self.ensure_feature_scaler(&mut fit_cursor)?;
        let report = self.build_chunks(&mut build_cursor, &feature_scaler, token)?;
        let split = self.split()?;
        if split.train.is_empty() {
            return Err(DatasetError::EmptyDataset(format!(
                "no chunks in {} after building",
                self.store.dir().display()
            )));
        }
        let target_scalers = self.ensure_target_scalers(&split.train)?;

        Ok(PreparedDataset {
            feature_scaler,
            scaler_origin,
            report,
            split,
            target_scalers,
        })
    }

    /// Shuffling generator over on-disk chunks.
    pub fn train_generator(
        &self,
        chunk_ids: &[u32],
        target_scalers: Option<TargetScalers>,
    ) -> Result<BatchGenerator<ChunkedDataset>> {
        self.chunked_generator(chunk_ids, self.config.generator.clone(), target_scalers)
    }

    /// Ordered, unshuffled generator over on-disk chunks.
    pub fn validation_generator(
        &self,
        chunk_ids: &[u32],
        target_scalers: Option<TargetScalers>,
    ) -> Result<BatchGenerator<ChunkedDataset>> {
        let config = self.config.generator.clone().with_shuffle(false);
        self.chunked_generator(chunk_ids, config, target_scalers)
    }

    /// Generator over chunks loaded into memory, balanced when configured.
    pub fn in_memory_generator(
        &self,
        chunk_ids: &[u32],
        target_scalers: Option<TargetScalers>,
    ) -> Result<BatchGenerator<InMemoryDataset>> {
        let mut dataset = InMemoryDataset::load_chunks(&self.store, chunk_ids)?;
        if self.config.balance.enabled {
            let balancer = ClassBalancer::new(self.config.balance.seed);
            dataset = dataset.balanced(&balancer)?.0;
        }
        let generator = BatchGenerator::new(dataset, self.config.generator.clone())?;
        Ok(attach_scalers(generator, target_scalers))
    }

    fn chunked_generator(
        &self,
        chunk_ids: &[u32],
        config: GeneratorConfig,
        target_scalers: Option<TargetScalers>,
    ) -> Result<BatchGenerator<ChunkedDataset>> {
        let dataset = ChunkedDataset::from_chunks(self.store.clone(), chunk_ids)?
            .with_parallel_reads(config.parallel_reads);
        let generator = BatchGenerator::new(dataset, config)?;
        Ok(attach_scalers(generator, target_scalers))
    }
}

fn attach_scalers<S: crate::dataset::SequenceSource>(
    generator: BatchGenerator<S>,
    target_scalers: Option<TargetScalers>,
) -> BatchGenerator<S> {
    match target_scalers {
        Some(scalers) => generator.with_target_scalers(scalers),
        None => generator,
    }
}
