//! Sliding-window sequence generation with next-event targets.
//!
//! For a run of `M` cleaned records and window length `L`, start offset `i`
//! (for `i` in `0..=M-L-2`) produces:
//!
//! ```text
//! records:  [ i ... i+L-1 ] [ i+L ] [ i+L+1 ]
//!            └── input ───┘ target  lookahead
//! ```
//!
//! A run shorter than `L + 2` yields no sequences. That is a normal outcome
//! for small batches and callers skip the batch.
//!
//! # Memory Layout
//!
//! Input features are scaled once per record, then every window copies its
//! `L × 4` slice into one contiguous `Vec<f32>` that becomes the
//! `(n, L, 4)` tensor. The record buffer is never modified.

use crate::error::{DatasetError, Result};
use crate::labeling::{OccurrenceStats, TargetArrays, TargetTuple};
use crate::preprocessing::Scaler;
use crate::record::{clean_records, RawRecord, Record, FEATURE_COUNT};
use chrono::{DateTime, Utc};
use ndarray::Array3;

/// Sequences and targets produced by one windowing call.
#[derive(Debug, Clone)]
pub struct WindowedBatch {
    /// Scaled inputs, shape `(n, L, 4)`.
    pub inputs: Array3<f32>,
    /// Raw-unit targets for each sequence.
    pub targets: TargetArrays,
    /// Candidate windows dropped for non-finite values.
    pub skipped_windows: usize,
    /// Records the call received.
    pub source_records: usize,
    /// Time of the first source record.
    pub first_time: Option<DateTime<Utc>>,
    /// Time of the last source record.
    pub last_time: Option<DateTime<Utc>>,
}

impl WindowedBatch {
    fn empty(sequence_length: usize, records: &[Record]) -> Self {
        Self {
            inputs: Array3::zeros((0, sequence_length, FEATURE_COUNT)),
            targets: TargetArrays::default(),
            skipped_windows: 0,
            source_records: records.len(),
            first_time: records.first().map(|r| r.time),
            last_time: records.last().map(|r| r.time),
        }
    }

    /// Number of sequences.
    pub fn len(&self) -> usize {
        self.inputs.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sequence_length(&self) -> usize {
        self.inputs.shape()[1]
    }

    pub fn occurrence_stats(&self) -> OccurrenceStats {
        self.targets.occurrence_stats()
    }
}

/// Turns time-sorted records into `(sequence, targets)` pairs.
///
/// Stateless apart from the window length; the scaler is passed per call and
/// only read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceWindower {
    sequence_length: usize,
}

impl SequenceWindower {
    pub fn new(sequence_length: usize) -> Result<Self> {
        if sequence_length == 0 {
            return Err(DatasetError::InvalidConfig(
                "sequence_length must be > 0".to_string(),
            ));
        }
        Ok(Self { sequence_length })
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    /// Fewest records that produce a sequence: `L + 2`.
    #[inline]
    pub fn min_records(&self) -> usize {
        self.sequence_length + 2
    }

    /// Number of windows a run of `n_records` yields when every record is valid.
    #[inline]
    pub fn max_sequences(&self, n_records: usize) -> usize {
        n_records.saturating_sub(self.sequence_length + 1)
    }

    /// Window a cleaned, strictly time-ordered run of records.
    ///
    /// Windows whose scaled inputs contain a non-finite value, or whose
    /// target record has a non-finite field, are skipped and counted.
    pub fn window<S: Scaler + ?Sized>(
        &self,
        records: &[Record],
        scaler: &S,
    ) -> Result<WindowedBatch> {
        check_scaler_width(scaler)?;

        let l = self.sequence_length;
        let m = records.len();
        if m < self.min_records() {
            log::debug!(
                "Windowing {m} records with L={l}: fewer than {} records, no sequences",
                self.min_records()
            );
            return Ok(WindowedBatch::empty(l, records));
        }

        let scaled = scale_records(records, scaler);

        // bad_prefix[k] = number of non-finite rows among scaled[..k]
        let mut bad_prefix = Vec::with_capacity(m + 1);
        bad_prefix.push(0usize);
        for row in &scaled {
            let bad = row.iter().any(|v| !v.is_finite());
            bad_prefix.push(bad_prefix[bad_prefix.len() - 1] + usize::from(bad));
        }

        let candidates = self.max_sequences(m);
        let mut data: Vec<f32> = Vec::with_capacity(candidates * l * FEATURE_COUNT);
        let mut tuples: Vec<TargetTuple> = Vec::with_capacity(candidates);
        let mut skipped = 0usize;

        for i in 0..candidates {
            let target = &records[i + l];
            let lookahead = &records[i + l + 1];

            if bad_prefix[i + l] - bad_prefix[i] > 0 || !target_is_valid(target) {
                skipped += 1;
                log::debug!("Skipping window at offset {i}: non-finite value");
                continue;
            }

            for row in &scaled[i..i + l] {
                data.extend(row.iter().map(|&v| v as f32));
            }
            tuples.push(TargetTuple::from_records(target, lookahead));
        }

        let n = tuples.len();
        let inputs = Array3::from_shape_vec((n, l, FEATURE_COUNT), data)?;

        Ok(WindowedBatch {
            inputs,
            targets: TargetArrays::from_tuples(&tuples),
            skipped_windows: skipped,
            source_records: m,
            first_time: records.first().map(|r| r.time),
            last_time: records.last().map(|r| r.time),
        })
    }

    /// Model input for the most recent `L` records of `raw`.
    ///
    /// The records are cleaned first; the result has shape `(1, L, 4)`.
    pub fn inference_input<S: Scaler + ?Sized>(
        &self,
        raw: Vec<RawRecord>,
        scaler: &S,
    ) -> Result<Array3<f32>> {
        check_scaler_width(scaler)?;

        let (records, _) = clean_records(raw);
        let l = self.sequence_length;
        if records.len() < l {
            return Err(DatasetError::InsufficientRecords {
                required: l,
                available: records.len(),
            });
        }

        let recent = &records[records.len() - l..];
        let scaled = scale_records(recent, scaler);
        let data: Vec<f32> = scaled
            .iter()
            .flat_map(|row| row.iter().map(|&v| v as f32))
            .collect();
        Ok(Array3::from_shape_vec((1, l, FEATURE_COUNT), data)?)
    }
}

fn check_scaler_width<S: Scaler + ?Sized>(scaler: &S) -> Result<()> {
    if scaler.n_features() != FEATURE_COUNT {
        return Err(DatasetError::ShapeMismatch(format!(
            "feature scaler has {} features, records have {FEATURE_COUNT}",
            scaler.n_features()
        )));
    }
    Ok(())
}

fn scale_records<S: Scaler + ?Sized>(records: &[Record], scaler: &S) -> Vec<[f64; FEATURE_COUNT]> {
    records
        .iter()
        .map(|r| {
            let mut row = r.features();
            for (j, v) in row.iter_mut().enumerate() {
                *v = scaler.transform_value(j, *v);
            }
            row
        })
        .collect()
}

#[inline]
fn target_is_valid(target: &Record) -> bool {
    target.magnitude.is_finite() && target.latitude.is_finite() && target.longitude.is_finite()
}
