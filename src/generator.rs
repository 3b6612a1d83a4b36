//! Minibatch generation over a [`SequenceSource`].
//!
//! # Iteration order
//!
//! The generator keeps an iteration-order array over global sequence
//! indices. Batch `i` is the slice `order[i * batch_size..]` of at most
//! `batch_size` entries. Without shuffling the order is ascending and fixed,
//! so two generators over the same source yield identical batches. With
//! shuffling the order is permuted at construction and again at every
//! [`on_epoch_end`](BatchGenerator::on_epoch_end), driven by a seeded RNG.
//!
//! # Batch count
//!
//! ```text
//! KeepPartial: ceil(n / batch_size)   last batch may be short, never padded
//! DropPartial: floor(n / batch_size)  trailing sequences sit out the epoch
//! ```
//!
//! # Target scaling
//!
//! When [`TargetScalers`] are attached, each regression target of every
//! batch is scaled on the way out. The occurrence label is never touched.
//!
//! # Cancellation
//!
//! [`BatchGenerator::iter_epoch`] checks a [`CancellationToken`] between
//! batches. Generation holds no partial state, so stopping is always clean.

use crate::config::GeneratorConfig;
use crate::dataset::{Batch, SequenceSource};
use crate::error::{DatasetError, Result};
use crate::labeling::TargetKind;
use crate::preprocessing::{Scaler, TargetScalers};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use crate::config::BatchRounding;

/// Token for cancelling long-running work from another thread.
///
/// Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Safe to call from any thread at any time.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Reset the token for reuse. Only call when no work is active.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// Shuffled or ordered minibatches with optional target scaling.
#[derive(Debug)]
pub struct BatchGenerator<S: SequenceSource> {
    source: S,
    config: GeneratorConfig,
    target_scalers: Option<TargetScalers>,
    order: Vec<usize>,
    rng: StdRng,
    epoch: usize,
}

impl<S: SequenceSource> BatchGenerator<S> {
    /// Create a generator. Fails on an invalid config or when the source
    /// would produce zero batches.
    pub fn new(source: S, config: GeneratorConfig) -> Result<Self> {
        config.validate().map_err(DatasetError::InvalidConfig)?;

        let n = source.len();
        if n == 0 {
            return Err(DatasetError::EmptyDataset(
                "sequence source holds zero sequences".to_string(),
            ));
        }
        if config.rounding.batch_count(n, config.batch_size) == 0 {
            return Err(DatasetError::EmptyDataset(format!(
                "{n} sequences do not fill one batch of {} with partial batches dropped",
                config.batch_size
            )));
        }

        let mut generator = Self {
            order: (0..n).collect(),
            rng: StdRng::seed_from_u64(config.seed),
            source,
            config,
            target_scalers: None,
            epoch: 0,
        };
        if generator.config.shuffle {
            generator.order.shuffle(&mut generator.rng);
        }

        log::info!(
            "Batch generator: {} sequences, {} batches of {} (shuffle={}, {:?})",
            n,
            generator.len(),
            generator.config.batch_size,
            generator.config.shuffle,
            generator.config.rounding
        );
        Ok(generator)
    }

    /// Scale regression targets of every batch with `scalers`.
    pub fn with_target_scalers(mut self, scalers: TargetScalers) -> Self {
        self.target_scalers = if scalers.is_empty() { None } else { Some(scalers) };
        self
    }

    /// Number of batches per epoch.
    pub fn len(&self) -> usize {
        self.config
            .rounding
            .batch_count(self.order.len(), self.config.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of sequences in the source.
    pub fn n_sequences(&self) -> usize {
        self.order.len()
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    /// Completed epochs.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn target_scalers(&self) -> Option<&TargetScalers> {
        self.target_scalers.as_ref()
    }

    /// Current iteration order over global indices.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Global indices that make up batch `index`.
    pub fn batch_indices(&self, index: usize) -> Result<&[usize]> {
        let total = self.len();
        if index >= total {
            return Err(DatasetError::BatchOutOfRange { index, total });
        }
        let start = index * self.config.batch_size;
        let end = (start + self.config.batch_size).min(self.order.len());
        Ok(&self.order[start..end])
    }

    /// Assemble batch `index`.
    pub fn get_batch(&self, index: usize) -> Result<Batch> {
        let indices = self.batch_indices(index)?;
        let mut batch = self.source.fetch(indices)?;
        if let Some(scalers) = &self.target_scalers {
            apply_target_scalers(&mut batch, scalers);
        }
        Ok(batch)
    }

    /// Advance the epoch counter and reshuffle when shuffling is enabled.
    pub fn on_epoch_end(&mut self) {
        self.epoch += 1;
        if self.config.shuffle {
            self.order.shuffle(&mut self.rng);
        }
    }

    /// Iterate one epoch's batches in order.
    ///
    /// Iteration stops early, between batches, once `token` is cancelled.
    pub fn iter_epoch<'a>(&'a self, token: Option<&'a CancellationToken>) -> EpochIter<'a, S> {
        EpochIter {
            generator: self,
            next: 0,
            token,
        }
    }
}

/// Iterator returned by [`BatchGenerator::iter_epoch`].
pub struct EpochIter<'a, S: SequenceSource> {
    generator: &'a BatchGenerator<S>,
    next: usize,
    token: Option<&'a CancellationToken>,
}

impl<'a, S: SequenceSource> EpochIter<'a, S> {
    /// True if iteration ended because of cancellation.
    pub fn was_cancelled(&self) -> bool {
        self.next < self.generator.len() && self.token.is_some_and(|t| t.is_cancelled())
    }
}

impl<'a, S: SequenceSource> Iterator for EpochIter<'a, S> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.generator.len() {
            return None;
        }
        if self.token.is_some_and(|t| t.is_cancelled()) {
            log::info!(
                "Epoch iteration cancelled after {} of {} batches",
                self.next,
                self.generator.len()
            );
            return None;
        }
        let batch = self.generator.get_batch(self.next);
        self.next += 1;
        Some(batch)
    }
}

fn apply_target_scalers(batch: &mut Batch, scalers: &TargetScalers) {
    for kind in TargetKind::REGRESSION {
        if let (Some(scaler), Some(column)) = (scalers.get(kind), batch.targets.regression_mut(kind))
        {
            column.mapv_inplace(|v| scaler.transform_value(0, v as f64) as f32);
        }
    }
}
