//! On-disk chunk storage for windowed datasets.
//!
//! A dataset too large for memory is stored as many independent, write-once
//! chunk files in one directory. Each chunk is a compressed NumPy archive
//! plus a JSON sidecar:
//!
//! ```text
//! outputs/processed/
//! ├── chunk_00000.npz    X (N, L, 4) f32, y_class (N) u8,
//! │                      y_mag, y_lat, y_lon, y_time (N) f32
//! ├── chunk_00000.json   ChunkMetadata
//! ├── chunk_00001.npz
//! └── chunk_00001.json
//! ```
//!
//! The archives load directly in Python with `numpy.load(path)`.
//!
//! # Guarantees
//!
//! - All six arrays in a chunk share their first dimension
//! - Archives and sidecars appear atomically (temp file then rename), so a
//!   cancelled run never leaves a half-written chunk
//! - Targets are stored in physical units; scaling happens at batch time

mod chunk_store;
mod metadata;

pub use chunk_store::{ChunkStore, ChunkWriteOutcome, INPUTS_KEY};
pub use metadata::ChunkMetadata;
pub(crate) use metadata::write_atomic;
