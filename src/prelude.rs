//! Prelude module for convenient imports.
//!
//! # Usage
//!
//! ```ignore
//! use seismic_dataset::prelude::*;
//!
//! let pipeline = Pipeline::new(PipelineConfig::default())?;
//! let (scaler, _) = pipeline.ensure_feature_scaler(&mut VecCursor::new(raw.clone()))?;
//! let report = pipeline.build_chunks(&mut VecCursor::new(raw), &scaler, None)?;
//! ```
//!
//! # What's Included
//!
//! ## Core Pipeline
//! - [`Pipeline`] - Dataset preparation
//! - [`PipelineConfig`] - Pipeline configuration
//! - [`ChunkingReport`] - Counters from a chunk building run
//!
//! ## Records
//! - [`Record`] / [`RawRecord`] - Validated and raw events
//! - [`RecordCursor`] - Ordered record source
//!
//! ## Windowing
//! - [`SequenceWindower`] - Sequences and targets from sorted records
//! - [`StreamingWindower`] - Windowing across batch boundaries
//!
//! ## Batches
//! - [`BatchGenerator`] - Shuffled minibatches
//! - [`ChunkedDataset`] / [`InMemoryDataset`] - Sequence sources

// ============================================================================
// Core Pipeline
// ============================================================================

pub use crate::config::{
    BalanceConfig, ChunkConfig, ExperimentMetadata, GeneratorConfig, PipelineConfig, ScalerConfig,
    SplitConfig, WindowConfig,
};
pub use crate::error::{DatasetError, Result};
pub use crate::pipeline::{split_chunks, ChunkingReport, DatasetSplit, Pipeline, PreparedDataset};

// ============================================================================
// Records
// ============================================================================

pub use crate::record::{
    clean_records, CleaningStats, JsonLinesCursor, RawRecord, Record, RecordCursor, VecCursor,
};
pub use crate::validation::{validate_record_times, ValidationLevel, ValidationResult};

// ============================================================================
// Preprocessing
// ============================================================================

pub use crate::preprocessing::{
    ensure_feature_scaler, ClassBalancer, MinMaxScaler, Scaler, ScalerOrigin, TargetScalers,
};

// ============================================================================
// Windowing & Labeling
// ============================================================================

pub use crate::labeling::{OccurrenceStats, TargetArrays, TargetKind};
pub use crate::sequence_builder::{SequenceWindower, StreamingWindower, WindowedBatch};

// ============================================================================
// Storage & Batches
// ============================================================================

pub use crate::dataset::{Batch, ChunkedDataset, InMemoryDataset, SequenceSource};
pub use crate::export::{ChunkStore, ChunkWriteOutcome};
pub use crate::generator::{BatchGenerator, BatchRounding, CancellationToken};

// ============================================================================
// Evaluation
// ============================================================================

pub use crate::evaluation::{evaluate, EvaluationReport, Predictions, SequenceModel};
