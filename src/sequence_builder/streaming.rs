//! Resumable windowing over successive record batches.
//!
//! A [`StreamingWindower`] carries the trailing `L + 1` records of each call
//! into the next one, so sequences can span a batch boundary. That overlap
//! is exactly what the next window needs and no window is ever emitted
//! twice.
//!
//! Batches must be contiguous: the first record of a batch must be strictly
//! later than the retained tail, and, when a maximum gap is configured, no
//! further than that from it. Anything else is rejected with
//! [`DatasetError::DiscontinuousBatch`] and the caller decides whether to
//! [`reset`](StreamingWindower::reset) and window the batch on its own.

use super::windower::{SequenceWindower, WindowedBatch};
use crate::error::{DatasetError, Result};
use crate::preprocessing::Scaler;
use crate::record::Record;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone)]
pub struct StreamingWindower {
    windower: SequenceWindower,
    tail: Vec<Record>,
    max_gap: Option<Duration>,
    total_sequences: u64,
}

impl StreamingWindower {
    pub fn new(windower: SequenceWindower) -> Self {
        Self {
            windower,
            tail: Vec::with_capacity(windower.sequence_length() + 1),
            max_gap: None,
            total_sequences: 0,
        }
    }

    /// Reject batches starting more than `seconds` after the retained tail.
    pub fn with_max_gap_seconds(mut self, seconds: u64) -> Self {
        self.max_gap = Some(Duration::seconds(seconds as i64));
        self
    }

    /// Window `records` as a continuation of everything pushed so far.
    ///
    /// On error the carried state is left untouched.
    pub fn push<S: Scaler + ?Sized>(
        &mut self,
        records: &[Record],
        scaler: &S,
    ) -> Result<WindowedBatch> {
        if let (Some(last), Some(first)) = (self.tail.last(), records.first()) {
            if first.time <= last.time {
                return Err(DatasetError::DiscontinuousBatch(format!(
                    "batch starts at {} but previous batch ended at {}",
                    first.time, last.time
                )));
            }
            if let Some(max_gap) = self.max_gap {
                let gap = first.time - last.time;
                if gap > max_gap {
                    return Err(DatasetError::DiscontinuousBatch(format!(
                        "gap of {}s exceeds the maximum of {}s",
                        gap.num_seconds(),
                        max_gap.num_seconds()
                    )));
                }
            }
        }

        let mut combined = Vec::with_capacity(self.tail.len() + records.len());
        combined.extend_from_slice(&self.tail);
        combined.extend_from_slice(records);

        let batch = self.windower.window(&combined, scaler)?;

        let keep = combined.len().min(self.windower.sequence_length() + 1);
        self.tail = combined.split_off(combined.len() - keep);
        self.total_sequences += batch.len() as u64;
        Ok(batch)
    }

    /// Time of the newest retained record.
    pub fn last_time(&self) -> Option<DateTime<Utc>> {
        self.tail.last().map(|r| r.time)
    }

    /// Records carried into the next call.
    pub fn carried(&self) -> usize {
        self.tail.len()
    }

    /// Sequences emitted since creation or the last reset.
    pub fn total_sequences(&self) -> u64 {
        self.total_sequences
    }

    pub fn windower(&self) -> &SequenceWindower {
        &self.windower
    }

    /// Drop the carried tail; the next batch is windowed independently.
    pub fn reset(&mut self) {
        self.tail.clear();
        self.total_sequences = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::MinMaxScaler;

    fn scaler() -> MinMaxScaler {
        MinMaxScaler::from_bounds(vec![0.0; 4], vec![1.0; 4]).unwrap()
    }

    fn run(range: std::ops::Range<i64>) -> Vec<Record> {
        range
            .map(|i| {
                Record::new(
                    DateTime::<Utc>::from_timestamp_millis(i * 60_000).unwrap(),
                    i as f64,
                    0.0,
                    5.0,
                    1.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_split_equals_whole() {
        let w = SequenceWindower::new(4).unwrap();
        let whole = w.window(&run(0..20), &scaler()).unwrap();

        let mut streaming = StreamingWindower::new(w);
        let mut lats = Vec::new();
        for part in [0..3, 3..9, 9..10, 10..20] {
            let batch = streaming.push(&run(part), &scaler()).unwrap();
            lats.extend(batch.targets.latitude.iter().copied());
        }

        assert_eq!(lats, whole.targets.latitude.to_vec());
        assert_eq!(streaming.total_sequences(), whole.len() as u64);
        assert_eq!(streaming.carried(), 5);
    }

    #[test]
    fn test_overlapping_batch_rejected() {
        let mut streaming = StreamingWindower::new(SequenceWindower::new(3).unwrap());
        streaming.push(&run(0..10), &scaler()).unwrap();

        let err = streaming.push(&run(9..15), &scaler()).unwrap_err();
        assert!(matches!(err, DatasetError::DiscontinuousBatch(_)));
        // State unchanged, a contiguous batch still works
        assert_eq!(streaming.push(&run(10..12), &scaler()).unwrap().len(), 2);
    }

    #[test]
    fn test_gap_rejected_then_reset() {
        let mut streaming =
            StreamingWindower::new(SequenceWindower::new(3).unwrap()).with_max_gap_seconds(120);
        streaming.push(&run(0..10), &scaler()).unwrap();

        assert!(streaming.push(&run(20..30), &scaler()).is_err());

        streaming.reset();
        assert_eq!(streaming.carried(), 0);
        let batch = streaming.push(&run(20..30), &scaler()).unwrap();
        assert_eq!(batch.len(), 10 - 3 - 1);
    }
}
