//! Dataset backed by a chunk directory.

use super::{reassemble, Batch, ChunkIndex, ChunkRequest, SequenceSource};
use crate::error::{DatasetError, Result};
use crate::export::ChunkStore;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Random access over the chunks of a [`ChunkStore`].
///
/// Each fetch groups the requested indices by chunk, reads every needed
/// chunk exactly once, then restores request order. With `parallel_reads`
/// the chunk reads run on the rayon pool; results are still joined in chunk
/// order before reassembly, so output never depends on thread timing.
///
/// Any missing or corrupt chunk fails the whole fetch with
/// [`DatasetError::ChunkUnreadable`]; the index is untouched and other
/// fetches keep working.
#[derive(Debug, Clone)]
pub struct ChunkedDataset {
    store: ChunkStore,
    index: ChunkIndex,
    sequence_length: usize,
    parallel_reads: bool,
}

impl ChunkedDataset {
    /// Index every chunk in `dir`.
    pub fn open<P: AsRef<std::path::Path>>(dir: P) -> Result<Self> {
        let store = ChunkStore::open(dir)?;
        let ids = store.list_chunk_ids()?;
        Self::from_chunks(store, &ids)
    }

    /// Index a subset of the chunks in `store`, in the given order.
    pub fn from_chunks(store: ChunkStore, chunk_ids: &[u32]) -> Result<Self> {
        if chunk_ids.is_empty() {
            return Err(DatasetError::EmptyDataset(format!(
                "no chunk files in {}",
                store.dir().display()
            )));
        }

        let index = ChunkIndex::build(&store, chunk_ids)?;
        if index.is_empty() {
            return Err(DatasetError::EmptyDataset(format!(
                "{} chunks in {} hold zero sequences",
                chunk_ids.len(),
                store.dir().display()
            )));
        }

        let sequence_length = read_sequence_length(&store, &index)?;

        Ok(Self {
            store,
            index,
            sequence_length,
            parallel_reads: false,
        })
    }

    /// Read the chunks of one fetch concurrently.
    pub fn with_parallel_reads(mut self, enabled: bool) -> Self {
        self.parallel_reads = enabled;
        self
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn parallel_reads(&self) -> bool {
        self.parallel_reads
    }

    fn read_requests(&self, requests: &[ChunkRequest]) -> Result<Vec<Batch>> {
        #[cfg(feature = "parallel")]
        {
            if self.parallel_reads && requests.len() > 1 {
                return requests
                    .par_iter()
                    .map(|r| self.store.read_rows(r.chunk_id, &r.local_offsets))
                    .collect();
            }
        }

        requests
            .iter()
            .map(|r| self.store.read_rows(r.chunk_id, &r.local_offsets))
            .collect()
    }
}

impl SequenceSource for ChunkedDataset {
    fn len(&self) -> usize {
        self.index.len()
    }

    fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    fn index(&self) -> &ChunkIndex {
        &self.index
    }

    fn fetch(&self, indices: &[usize]) -> Result<Batch> {
        if indices.is_empty() {
            return Ok(Batch::empty(self.sequence_length));
        }

        let requests = self.index.group_by_chunk(indices).ok_or_else(|| {
            DatasetError::ShapeMismatch(format!(
                "sequence index out of range for {} sequences",
                self.index.len()
            ))
        })?;

        let parts = self.read_requests(&requests)?;
        if let Some(part) = parts.iter().find(|p| p.sequence_length() != self.sequence_length) {
            return Err(DatasetError::ShapeMismatch(format!(
                "chunk sequence length {} differs from dataset sequence length {}",
                part.sequence_length(),
                self.sequence_length
            )));
        }

        reassemble(&requests, parts, indices.len())
    }
}

/// Window length from the first non-empty chunk's sidecar, or its archive.
fn read_sequence_length(store: &ChunkStore, index: &ChunkIndex) -> Result<usize> {
    let first = index
        .chunk_ids()
        .iter()
        .copied()
        .find(|&id| index.chunk_len(id).unwrap_or(0) > 0)
        .ok_or_else(|| DatasetError::EmptyDataset("no non-empty chunk".to_string()))?;

    if let Some(metadata) = store.read_metadata(first)? {
        return Ok(metadata.sequence_length);
    }
    Ok(store.read_chunk(first)?.sequence_length())
}
