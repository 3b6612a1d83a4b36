//! Dataset held entirely in memory.

use super::{Batch, ChunkIndex, SequenceSource};
use crate::error::{DatasetError, Result};
use crate::export::ChunkStore;
use crate::labeling::TargetArrays;
use crate::preprocessing::{BalancedIndices, ClassBalancer};
use crate::sequence_builder::WindowedBatch;

/// Sequences and targets as owned arrays with a 1:1 index.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    data: Batch,
    index: ChunkIndex,
}

impl InMemoryDataset {
    pub fn new(data: Batch) -> Result<Self> {
        if data.targets.len() != data.len() {
            return Err(DatasetError::ShapeMismatch(format!(
                "{} input sequences but {} targets",
                data.len(),
                data.targets.len()
            )));
        }
        let index = ChunkIndex::from_in_memory(data.len());
        Ok(Self { data, index })
    }

    pub fn from_windowed(batch: WindowedBatch) -> Result<Self> {
        Self::new(Batch {
            inputs: batch.inputs,
            targets: batch.targets,
        })
    }

    /// Load and concatenate `chunk_ids` from `store`.
    pub fn load_chunks(store: &ChunkStore, chunk_ids: &[u32]) -> Result<Self> {
        let mut parts = Vec::with_capacity(chunk_ids.len());
        for &id in chunk_ids {
            parts.push(store.read_chunk(id)?);
        }
        if parts.is_empty() {
            return Err(DatasetError::EmptyDataset(format!(
                "no chunks to load from {}",
                store.dir().display()
            )));
        }
        Self::new(Batch::concatenate(&parts)?)
    }

    pub fn inputs(&self) -> &ndarray::Array3<f32> {
        &self.data.inputs
    }

    pub fn targets(&self) -> &TargetArrays {
        &self.data.targets
    }

    pub fn into_batch(self) -> Batch {
        self.data
    }

    /// Upsample the minority occurrence class.
    ///
    /// The balanced rows become a new dataset; `self` is unchanged. A single
    /// class dataset comes back as an identical copy.
    pub fn balanced(&self, balancer: &ClassBalancer) -> Result<(Self, BalancedIndices)> {
        let labels = self.data.targets.occurrence.to_vec();
        let result = balancer.balance_indices(&labels);
        let dataset = if result.applied {
            Self::new(self.data.select(&result.indices))?
        } else {
            self.clone()
        };
        Ok((dataset, result))
    }
}

impl SequenceSource for InMemoryDataset {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn sequence_length(&self) -> usize {
        self.data.sequence_length()
    }

    fn index(&self) -> &ChunkIndex {
        &self.index
    }

    fn fetch(&self, indices: &[usize]) -> Result<Batch> {
        let n = self.data.len();
        if let Some(&bad) = indices.iter().find(|&&i| i >= n) {
            return Err(DatasetError::ShapeMismatch(format!(
                "sequence index {bad} out of range for {n} sequences"
            )));
        }
        Ok(self.data.select(indices))
    }
}
