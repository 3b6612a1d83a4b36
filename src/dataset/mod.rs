//! Backing stores for batch generation.
//!
//! The generator only needs random access to sequences by global index. Two
//! stores provide it behind one trait:
//!
//! ```text
//! SequenceSource (trait)
//!     ├── InMemoryDataset   arrays held in memory, trivial index
//!     └── ChunkedDataset    chunk directory on disk, ChunkIndex over sidecars
//! ```
//!
//! Both return rows in exactly the order they were requested, regardless of
//! how those rows are laid out in storage.

mod chunked;
mod in_memory;
mod index;

pub use chunked::ChunkedDataset;
pub use in_memory::InMemoryDataset;
pub use index::{ChunkIndex, ChunkRequest, IndexEntry};

use crate::error::{DatasetError, Result};
use crate::labeling::TargetArrays;
use crate::record::FEATURE_COUNT;
use ndarray::{concatenate, Array1, Array3, ArrayView1, ArrayView3, Axis};

/// Input sequences and their targets.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Shape `(n, L, 4)`
    pub inputs: Array3<f32>,
    pub targets: TargetArrays,
}

impl Batch {
    pub fn empty(sequence_length: usize) -> Self {
        Self {
            inputs: Array3::zeros((0, sequence_length, FEATURE_COUNT)),
            targets: TargetArrays::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.inputs.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sequence_length(&self) -> usize {
        self.inputs.shape()[1]
    }

    /// Rows at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            inputs: self.inputs.select(Axis(0), indices),
            targets: self.targets.select(indices),
        }
    }

    /// Stack batches along the sequence axis.
    pub fn concatenate(parts: &[Batch]) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Err(DatasetError::ShapeMismatch(
                "cannot concatenate zero batches".to_string(),
            ));
        };
        if parts.len() == 1 {
            return Ok(first.clone());
        }

        let inputs: Vec<ArrayView3<'_, f32>> = parts.iter().map(|p| p.inputs.view()).collect();
        Ok(Self {
            inputs: concatenate(Axis(0), &inputs)?,
            targets: TargetArrays::new(
                stack_column(parts.iter().map(|p| p.targets.occurrence.view()))?,
                stack_column(parts.iter().map(|p| p.targets.magnitude.view()))?,
                stack_column(parts.iter().map(|p| p.targets.latitude.view()))?,
                stack_column(parts.iter().map(|p| p.targets.longitude.view()))?,
                stack_column(parts.iter().map(|p| p.targets.time_delta.view()))?,
            )?,
        })
    }
}

fn stack_column<'a, T, I>(views: I) -> Result<Array1<T>>
where
    T: Clone + 'a,
    I: Iterator<Item = ArrayView1<'a, T>>,
{
    let views: Vec<ArrayView1<'a, T>> = views.collect();
    Ok(concatenate(Axis(0), &views)?)
}

/// Random access to sequences by global index.
pub trait SequenceSource: Send + Sync {
    /// Total number of sequences.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Window length L.
    fn sequence_length(&self) -> usize;

    fn index(&self) -> &ChunkIndex;

    /// Rows at `indices`, returned in that order.
    fn fetch(&self, indices: &[usize]) -> Result<Batch>;
}

/// Put per-chunk reads back into request order.
///
/// `parts[k]` holds the rows of `requests[k]`, in that request's order.
pub(crate) fn reassemble(
    requests: &[ChunkRequest],
    parts: Vec<Batch>,
    batch_len: usize,
) -> Result<Batch> {
    // order[p] = row of the stacked parts that belongs at batch position p
    let mut order = vec![0usize; batch_len];
    let mut row = 0usize;
    for request in requests {
        for &position in &request.batch_positions {
            order[position] = row;
            row += 1;
        }
    }
    let stacked = Batch::concatenate(&parts)?;
    Ok(stacked.select(&order))
}
