//! Write-once chunk files in a single directory.

use super::metadata::ChunkMetadata;
use crate::dataset::Batch;
use crate::error::{DatasetError, Result};
use crate::labeling::{TargetArrays, TargetKind};
use crate::record::FEATURE_COUNT;
use crate::sequence_builder::WindowedBatch;
use chrono::Utc;
use ndarray::{Array, Array1, Array3, Axis, Dimension};
use ndarray_npy::{NpzReader, NpzWriter, ReadableElement};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Name of the input-sequence array inside a chunk archive.
pub const INPUTS_KEY: &str = "X";

const CHUNK_PREFIX: &str = "chunk_";
const CHUNK_EXTENSION: &str = "npz";

/// Result of [`ChunkStore::write_chunk`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkWriteOutcome {
    Written {
        chunk_id: u32,
        n_sequences: usize,
        path: PathBuf,
    },
    /// The batch held no sequences; nothing was written.
    Skipped { source_records: usize },
}

impl ChunkWriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, ChunkWriteOutcome::Written { .. })
    }

    pub fn n_sequences(&self) -> usize {
        match self {
            ChunkWriteOutcome::Written { n_sequences, .. } => *n_sequences,
            ChunkWriteOutcome::Skipped { .. } => 0,
        }
    }
}

/// Directory of `chunk_{id:05}.npz` archives and their JSON sidecars.
///
/// A chunk is never rewritten once its archive exists; new batches always
/// get a fresh id.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    dir: PathBuf,
}

impl ChunkStore {
    /// Open `dir`, creating it if needed.
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Open an existing chunk directory.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(DatasetError::EmptyDataset(format!(
                "chunk directory {} does not exist",
                dir.display()
            )));
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn chunk_path(&self, chunk_id: u32) -> PathBuf {
        self.dir
            .join(format!("{CHUNK_PREFIX}{chunk_id:05}.{CHUNK_EXTENSION}"))
    }

    pub fn metadata_path(&self, chunk_id: u32) -> PathBuf {
        self.dir.join(format!("{CHUNK_PREFIX}{chunk_id:05}.json"))
    }

    /// Ids of all chunk archives in the directory, ascending.
    pub fn list_chunk_ids(&self) -> Result<Vec<u32>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CHUNK_EXTENSION) {
                continue;
            }
            let id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_prefix(CHUNK_PREFIX))
                .and_then(|s| s.parse::<u32>().ok());
            if let Some(id) = id {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// First id not used by an existing chunk.
    pub fn next_chunk_id(&self) -> Result<u32> {
        Ok(self
            .list_chunk_ids()?
            .last()
            .map_or(0, |&id| id.saturating_add(1)))
    }

    /// Persist a windowed batch as chunk `chunk_id`.
    ///
    /// An empty batch is skipped, not an error. The archive is written to a
    /// temp file and renamed into place, then the sidecar is written the
    /// same way.
    pub fn write_chunk(&self, chunk_id: u32, batch: &WindowedBatch) -> Result<ChunkWriteOutcome> {
        if batch.is_empty() {
            log::warn!(
                "Skipping chunk {chunk_id}: no sequences from {} records",
                batch.source_records
            );
            return Ok(ChunkWriteOutcome::Skipped {
                source_records: batch.source_records,
            });
        }

        let path = self.chunk_path(chunk_id);
        if path.exists() {
            return Err(DatasetError::InvalidConfig(format!(
                "chunk {} already exists; chunks are write-once",
                path.display()
            )));
        }

        let temp_path = path.with_extension("npz.tmp");
        {
            let file = File::create(&temp_path)?;
            let mut npz = NpzWriter::new_compressed(file);
            let t = &batch.targets;
            npz.add_array(INPUTS_KEY, &batch.inputs)?;
            npz.add_array(TargetKind::Occurrence.chunk_key(), &t.occurrence)?;
            npz.add_array(TargetKind::Magnitude.chunk_key(), &t.magnitude)?;
            npz.add_array(TargetKind::Latitude.chunk_key(), &t.latitude)?;
            npz.add_array(TargetKind::Longitude.chunk_key(), &t.longitude)?;
            npz.add_array(TargetKind::TimeDelta.chunk_key(), &t.time_delta)?;
            let file = npz.finish()?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &path)?;

        let metadata = ChunkMetadata {
            chunk_id,
            n_sequences: batch.len(),
            sequence_length: batch.sequence_length(),
            n_features: FEATURE_COUNT,
            first_time: batch.first_time,
            last_time: batch.last_time,
            source_records: batch.source_records,
            skipped_windows: batch.skipped_windows,
            occurrence: batch.occurrence_stats(),
            created_at: Utc::now(),
        };
        metadata.save(&self.metadata_path(chunk_id))?;

        log::info!(
            "Wrote chunk {} ({} sequences, {} occurrences)",
            path.display(),
            metadata.n_sequences,
            metadata.occurrence.occurred
        );

        Ok(ChunkWriteOutcome::Written {
            chunk_id,
            n_sequences: metadata.n_sequences,
            path,
        })
    }

    /// Sidecar metadata, or `None` if the sidecar is absent.
    pub fn read_metadata(&self, chunk_id: u32) -> Result<Option<ChunkMetadata>> {
        let path = self.metadata_path(chunk_id);
        if !path.exists() {
            return Ok(None);
        }
        ChunkMetadata::load(&path)
            .map(Some)
            .map_err(|e| DatasetError::chunk_unreadable(path, e))
    }

    /// Sequence count from the sidecar, falling back to the archive's
    /// occurrence array.
    pub fn sequence_count(&self, chunk_id: u32) -> Result<usize> {
        if let Some(metadata) = self.read_metadata(chunk_id)? {
            return Ok(metadata.n_sequences);
        }
        log::debug!("Chunk {chunk_id} has no sidecar, reading y_class");
        let path = self.chunk_path(chunk_id);
        let mut npz = self.open_archive(&path)?;
        let labels: Array1<u8> = read_entry(&mut npz, &path, TargetKind::Occurrence.chunk_key())?;
        Ok(labels.len())
    }

    /// Every sequence and target of a chunk.
    pub fn read_chunk(&self, chunk_id: u32) -> Result<Batch> {
        let path = self.chunk_path(chunk_id);
        let mut npz = self.open_archive(&path)?;

        let inputs: Array3<f32> = read_entry(&mut npz, &path, INPUTS_KEY)?;
        if inputs.shape()[2] != FEATURE_COUNT {
            return Err(DatasetError::chunk_unreadable(
                path,
                format!("expected {FEATURE_COUNT} features, found {}", inputs.shape()[2]),
            ));
        }
        let targets = read_targets_from(&mut npz, &path)?;
        if targets.len() != inputs.shape()[0] {
            return Err(DatasetError::chunk_unreadable(
                path,
                format!(
                    "X holds {} sequences but targets hold {}",
                    inputs.shape()[0],
                    targets.len()
                ),
            ));
        }

        Ok(Batch { inputs, targets })
    }

    /// The rows at `offsets`, in that order.
    pub fn read_rows(&self, chunk_id: u32, offsets: &[usize]) -> Result<Batch> {
        let chunk = self.read_chunk(chunk_id)?;
        let n = chunk.len();
        if let Some(&bad) = offsets.iter().find(|&&o| o >= n) {
            return Err(DatasetError::chunk_unreadable(
                self.chunk_path(chunk_id),
                format!("offset {bad} out of range for {n} sequences"),
            ));
        }
        Ok(Batch {
            inputs: chunk.inputs.select(Axis(0), offsets),
            targets: chunk.targets.select(offsets),
        })
    }

    /// Only the five target arrays of a chunk.
    pub fn read_targets(&self, chunk_id: u32) -> Result<TargetArrays> {
        let path = self.chunk_path(chunk_id);
        let mut npz = self.open_archive(&path)?;
        read_targets_from(&mut npz, &path)
    }

    /// Delete every chunk archive and sidecar in the directory.
    pub fn clear(&self) -> Result<usize> {
        let ids = self.list_chunk_ids()?;
        for &id in &ids {
            fs::remove_file(self.chunk_path(id))?;
            let sidecar = self.metadata_path(id);
            if sidecar.exists() {
                fs::remove_file(sidecar)?;
            }
        }
        if !ids.is_empty() {
            log::info!("Removed {} chunks from {}", ids.len(), self.dir.display());
        }
        Ok(ids.len())
    }

    fn open_archive(&self, path: &Path) -> Result<NpzReader<BufReader<File>>> {
        let file = File::open(path).map_err(|e| DatasetError::chunk_unreadable(path, e))?;
        NpzReader::new(BufReader::new(file)).map_err(|e| DatasetError::chunk_unreadable(path, e))
    }
}

fn read_entry<T, D>(
    npz: &mut NpzReader<BufReader<File>>,
    path: &Path,
    key: &str,
) -> Result<Array<T, D>>
where
    T: ReadableElement,
    D: Dimension,
{
    npz.by_name(&format!("{key}.npy"))
        .map_err(|e| DatasetError::chunk_unreadable(path, e))
}

fn read_targets_from(npz: &mut NpzReader<BufReader<File>>, path: &Path) -> Result<TargetArrays> {
    let occurrence: Array1<u8> = read_entry(npz, path, TargetKind::Occurrence.chunk_key())?;
    let magnitude: Array1<f32> = read_entry(npz, path, TargetKind::Magnitude.chunk_key())?;
    let latitude: Array1<f32> = read_entry(npz, path, TargetKind::Latitude.chunk_key())?;
    let longitude: Array1<f32> = read_entry(npz, path, TargetKind::Longitude.chunk_key())?;
    let time_delta: Array1<f32> = read_entry(npz, path, TargetKind::TimeDelta.chunk_key())?;
    TargetArrays::new(occurrence, magnitude, latitude, longitude, time_delta)
        .map_err(|e| DatasetError::chunk_unreadable(path, e))
}
