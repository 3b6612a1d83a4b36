//! Seismic Dataset
//!
//! Supervised sequence datasets from time-ordered seismic event catalogs.
//!
//! # Overview
//!
//! This library turns a sorted stream of events (time, latitude, longitude,
//! depth, magnitude) into fixed-length training sequences with five
//! prediction targets, stores them as compressed chunk files so the dataset
//! can exceed memory, and reconstructs shuffled, scaled minibatches from
//! those chunks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Seismic Dataset                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  record/           - Records, cleaning, ordered cursors         │
//! │  preprocessing/    - Feature/target scalers, class balancing    │
//! │  sequence_builder/ - Windowing and target labeling              │
//! │  export/           - Chunk files (.npz + .json sidecar)         │
//! │  dataset/          - Chunk index, in-memory and chunked sources │
//! │  generator         - Shuffled minibatches with target scaling   │
//! │  pipeline          - End-to-end dataset preparation             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use seismic_dataset::prelude::*;
//!
//! let pipeline = Pipeline::new(PipelineConfig::default())?;
//! let prepared = pipeline.prepare(
//!     JsonLinesCursor::open("events.jsonl")?,
//!     JsonLinesCursor::open("events.jsonl")?,
//!     None,
//! )?;
//!
//! let generator = pipeline.train_generator(&prepared.split.train, prepared.target_scalers)?;
//! let batch = generator.get_batch(0)?;
//! assert_eq!(batch.inputs.shape()[2], 4);
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod export;
pub mod generator;
pub mod labeling;
pub mod pipeline;
pub mod prelude;
pub mod preprocessing;
pub mod record;
pub mod sequence_builder;
pub mod validation;

// Re-exports - Errors
pub use error::{DatasetError, Result};

// Re-exports - Config
pub use config::{
    BalanceConfig, ChunkConfig, ExperimentMetadata, GeneratorConfig, PipelineConfig, ScalerConfig,
    SplitConfig, WindowConfig,
};

// Re-exports - Records
pub use record::{
    clean_records, CleaningStats, JsonLinesCursor, RawRecord, Record, RecordCursor, VecCursor,
    FEATURE_COUNT, FEATURE_NAMES,
};

// Re-exports - Preprocessing
pub use preprocessing::{
    ensure_feature_scaler, BalancedIndices, ClassBalancer, MinMaxScaler, Scaler, ScalerOrigin,
    TargetScalers,
};

// Re-exports - Labeling
pub use labeling::{OccurrenceStats, TargetArrays, TargetKind, TargetTuple};

// Re-exports - Sequence Building
pub use sequence_builder::{SequenceWindower, StreamingWindower, WindowedBatch};

// Re-exports - Export
pub use export::{ChunkMetadata, ChunkStore, ChunkWriteOutcome};

// Re-exports - Dataset
pub use dataset::{Batch, ChunkIndex, ChunkedDataset, InMemoryDataset, SequenceSource};

// Re-exports - Generation
pub use generator::{BatchGenerator, BatchRounding, CancellationToken};

// Re-exports - Evaluation
pub use evaluation::{evaluate, EvaluationReport, Predictions, SequenceModel};

// Re-exports - Validation
pub use validation::{validate_record_times, ValidationLevel, ValidationResult};

// Re-exports - Pipeline
pub use pipeline::{split_chunks, ChunkingReport, DatasetSplit, Pipeline, PreparedDataset};
