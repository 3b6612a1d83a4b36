//! Error taxonomy for the dataset pipeline.
//!
//! Insufficient-data and invalid-record conditions are recovered locally by
//! the windower and the cleaner (they are counted, not raised). Everything in
//! this enum propagates to the caller and is never retried automatically.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DatasetError>;

/// Errors surfaced by the dataset pipeline.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// An operation that requires at least one complete window got too few records.
    #[error("insufficient records: need at least {required}, got {available}")]
    InsufficientRecords { required: usize, available: usize },

    /// A persisted scaler was required but not found.
    #[error("scaler not found at {}", path.display())]
    ScalerMissing { path: PathBuf },

    /// A chunk file referenced by the index is missing or corrupt.
    #[error("chunk {} is unreadable: {reason}", path.display())]
    ChunkUnreadable { path: PathBuf, reason: String },

    /// No chunks or no sequences left after filtering.
    #[error("empty dataset: {0}")]
    EmptyDataset(String),

    /// Requested batch index lies outside the generator's range.
    #[error("batch index {index} out of range (total batches: {total})")]
    BatchOutOfRange { index: usize, total: usize },

    /// A streaming batch does not continue the previously windowed records.
    #[error("discontinuous record batch: {0}")]
    DiscontinuousBatch(String),

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Array shapes disagree with each other or with the configuration.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("npz write error: {0}")]
    NpzWrite(#[from] ndarray_npy::WriteNpzError),
}

impl DatasetError {
    /// Wrap any displayable failure as an unreadable chunk.
    pub(crate) fn chunk_unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ChunkUnreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
