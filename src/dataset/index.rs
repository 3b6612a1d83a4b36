//! Global sequence addressing over a set of chunks.

use crate::error::Result;
use crate::export::ChunkStore;
use std::collections::BTreeMap;

/// Location of one sequence: chunk id and row within that chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexEntry {
    pub chunk_id: u32,
    pub local_offset: usize,
}

/// Rows a batch needs from a single chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRequest {
    pub chunk_id: u32,
    /// Rows to read, in request order
    pub local_offsets: Vec<usize>,
    /// Position of each row in the assembled batch
    pub batch_positions: Vec<usize>,
}

/// Flat mapping from global sequence index to `(chunk_id, local_offset)`.
///
/// Global indices follow chunk order: all rows of the first chunk, then all
/// rows of the second, and so on. The mapping never changes after
/// construction; shuffling only changes the order in which callers ask for
/// indices.
///
/// # Example
///
/// ```
/// use seismic_dataset::dataset::{ChunkIndex, IndexEntry};
///
/// let index = ChunkIndex::from_counts(vec![(0, 100), (1, 150), (2, 50)]);
/// assert_eq!(index.len(), 300);
/// assert_eq!(
///     index.resolve(120),
///     Some(IndexEntry { chunk_id: 1, local_offset: 20 })
/// );
/// assert_eq!(index.resolve(300), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkIndex {
    chunk_ids: Vec<u32>,
    counts: Vec<usize>,
    /// starts[k] = first global index of chunk k
    starts: Vec<usize>,
    total: usize,
}

impl ChunkIndex {
    /// Build from `(chunk_id, sequence_count)` pairs, in global order.
    pub fn from_counts(chunks: Vec<(u32, usize)>) -> Self {
        let mut chunk_ids = Vec::with_capacity(chunks.len());
        let mut counts = Vec::with_capacity(chunks.len());
        let mut starts = Vec::with_capacity(chunks.len());
        let mut total = 0usize;
        for (id, count) in chunks {
            chunk_ids.push(id);
            counts.push(count);
            starts.push(total);
            total += count;
        }
        Self {
            chunk_ids,
            counts,
            starts,
            total,
        }
    }

    /// Trivial index over `len` in-memory rows: one pseudo-chunk with id 0.
    pub fn from_in_memory(len: usize) -> Self {
        Self::from_counts(vec![(0, len)])
    }

    /// Read the sequence count of each chunk in `chunk_ids`.
    ///
    /// Sidecars are preferred; only chunks without one are opened.
    pub fn build(store: &ChunkStore, chunk_ids: &[u32]) -> Result<Self> {
        let mut chunks = Vec::with_capacity(chunk_ids.len());
        for &id in chunk_ids {
            chunks.push((id, store.sequence_count(id)?));
        }
        let index = Self::from_counts(chunks);
        log::info!(
            "Indexed {} sequences across {} chunks in {}",
            index.len(),
            index.n_chunks(),
            store.dir().display()
        );
        Ok(index)
    }

    /// Total number of sequences.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn n_chunks(&self) -> usize {
        self.chunk_ids.len()
    }

    pub fn chunk_ids(&self) -> &[u32] {
        &self.chunk_ids
    }

    /// Rows in `chunk_id`, if it is part of the index.
    pub fn chunk_len(&self, chunk_id: u32) -> Option<usize> {
        self.chunk_ids
            .iter()
            .position(|&id| id == chunk_id)
            .map(|k| self.counts[k])
    }

    /// Location of global index `global`, or `None` when out of range.
    pub fn resolve(&self, global: usize) -> Option<IndexEntry> {
        if global >= self.total {
            return None;
        }
        // Last chunk whose start is <= global. Empty chunks share their start
        // with the next chunk, so this always lands on a non-empty one.
        let k = self.starts.partition_point(|&s| s <= global) - 1;
        Some(IndexEntry {
            chunk_id: self.chunk_ids[k],
            local_offset: global - self.starts[k],
        })
    }

    /// Group global indices by chunk so each chunk is read once per batch.
    ///
    /// Requests come back in ascending chunk-id order. Out-of-range indices
    /// yield `None`.
    pub fn group_by_chunk(&self, globals: &[usize]) -> Option<Vec<ChunkRequest>> {
        let mut groups: BTreeMap<u32, ChunkRequest> = BTreeMap::new();
        for (position, &global) in globals.iter().enumerate() {
            let entry = self.resolve(global)?;
            let request = groups.entry(entry.chunk_id).or_insert_with(|| ChunkRequest {
                chunk_id: entry.chunk_id,
                local_offsets: Vec::new(),
                batch_positions: Vec::new(),
            });
            request.local_offsets.push(entry.local_offset);
            request.batch_positions.push(position);
        }
        Some(groups.into_values().collect())
    }
}
