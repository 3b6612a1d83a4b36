//! Occurrence-label class balancing by minority upsampling.
//!
//! The minority class is sampled with replacement until it matches the
//! majority count, then the combined index set is shuffled once. The
//! result has `2 × majority` entries with equal class counts.
//!
//! When either class is absent there is nothing to balance against and the
//! identity permutation is returned.

use crate::labeling::OccurrenceStats;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Outcome of [`ClassBalancer::balance_indices`].
#[derive(Debug, Clone)]
pub struct BalancedIndices {
    /// Row indices into the original arrays. Minority rows may repeat.
    pub indices: Vec<usize>,
    pub before: OccurrenceStats,
    pub after: OccurrenceStats,
    /// False when balancing was a no-op.
    pub applied: bool,
}

/// Seeded minority upsampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassBalancer {
    seed: u64,
}

impl ClassBalancer {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Indices of a balanced, shuffled resampling of `labels`.
    pub fn balance_indices(&self, labels: &[u8]) -> BalancedIndices {
        let before = OccurrenceStats::from_labels(labels.iter().copied());

        if !before.has_both_classes() {
            log::info!(
                "Class balancing skipped: {} occurrences, {} non-occurrences",
                before.occurred,
                before.not_occurred
            );
            return BalancedIndices {
                indices: (0..labels.len()).collect(),
                before,
                after: before,
                applied: false,
            };
        }

        let (positives, negatives): (Vec<usize>, Vec<usize>) =
            (0..labels.len()).partition(|&i| labels[i] != 0);
        let (majority, minority) = if positives.len() >= negatives.len() {
            (positives, negatives)
        } else {
            (negatives, positives)
        };

        let mut rng = StdRng::seed_from_u64(self.seed);
        let deficit = majority.len() - minority.len();

        let mut indices = Vec::with_capacity(2 * majority.len());
        indices.extend_from_slice(&majority);
        indices.extend_from_slice(&minority);
        for _ in 0..deficit {
            indices.push(minority[rng.gen_range(0..minority.len())]);
        }
        indices.shuffle(&mut rng);

        let after = OccurrenceStats::from_labels(indices.iter().map(|&i| labels[i]));
        log::info!(
            "Class balancing: {} -> {} sequences ({} minority rows drawn)",
            before.total,
            after.total,
            deficit
        );

        BalancedIndices {
            indices,
            before,
            after,
            applied: true,
        }
    }
}
