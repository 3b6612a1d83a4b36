//! Chunk sidecar metadata.

use crate::error::Result;
use crate::labeling::OccurrenceStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::Path;

/// Contents of `chunk_{id}.json`, written next to every chunk archive.
///
/// Lets the index learn a chunk's sequence count without opening the
/// archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_id: u32,

    /// First dimension of all six arrays
    pub n_sequences: usize,

    /// Window length L
    pub sequence_length: usize,

    /// Features per timestep
    pub n_features: usize,

    /// Time of the first record windowed into this chunk
    pub first_time: Option<DateTime<Utc>>,

    /// Time of the last record windowed into this chunk
    pub last_time: Option<DateTime<Utc>>,

    /// Records the windower received for this chunk
    pub source_records: usize,

    /// Windows dropped for non-finite values
    pub skipped_windows: usize,

    /// Occurrence label counts
    pub occurrence: OccurrenceStats,

    pub created_at: DateTime<Utc>,
}

impl ChunkMetadata {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Write via a temp file and rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &json)
    }
}

/// Write `bytes` to `path` through a sibling `.tmp` file and a rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}
