//! Seismic event records and the cursor interface over the backing store.
//!
//! The backing store (document or relational) is an external collaborator.
//! The pipeline only sees a [`RecordCursor`] yielding bounded, time-ordered
//! batches of [`RawRecord`]s, which [`clean_records`] turns into validated
//! [`Record`]s.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Number of input features per record: latitude, longitude, depth, magnitude.
pub const FEATURE_COUNT: usize = 4;

/// Names of the input features, in tensor order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = ["latitude", "longitude", "depth", "magnitude"];

/// A validated seismic event.
///
/// Every field is present and finite; `time` is a representable UTC instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub depth: f64,
    pub magnitude: f64,
}

impl Record {
    pub fn new(
        time: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
        depth: f64,
        magnitude: f64,
    ) -> Self {
        Self {
            time,
            latitude,
            longitude,
            depth,
            magnitude,
        }
    }

    /// Feature vector in tensor order.
    #[inline]
    pub fn features(&self) -> [f64; FEATURE_COUNT] {
        [self.latitude, self.longitude, self.depth, self.magnitude]
    }

    /// Fractional days from `self` to `later`. Negative when `later` precedes `self`.
    #[inline]
    pub fn days_until(&self, later: &Record) -> f64 {
        (later.time - self.time).num_milliseconds() as f64 / MILLIS_PER_DAY
    }
}

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// A record as it comes out of the store: any field may be missing.
///
/// `timestamp` is milliseconds since the Unix epoch. The depth and magnitude
/// fields accept the catalog's `depth_km` and `mag` spellings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default, alias = "depth_km")]
    pub depth: Option<f64>,
    #[serde(default, alias = "mag")]
    pub magnitude: Option<f64>,
}

impl RawRecord {
    /// Validate into a [`Record`], or `None` if any field is missing,
    /// non-finite, or the timestamp is out of range.
    pub fn into_record(self) -> Option<Record> {
        let time = DateTime::<Utc>::from_timestamp_millis(self.timestamp?)?;
        let values = [
            self.latitude?,
            self.longitude?,
            self.depth?,
            self.magnitude?,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Record::new(time, values[0], values[1], values[2], values[3]))
    }
}

impl From<Record> for RawRecord {
    fn from(record: Record) -> Self {
        Self {
            timestamp: Some(record.time.timestamp_millis()),
            latitude: Some(record.latitude),
            longitude: Some(record.longitude),
            depth: Some(record.depth),
            magnitude: Some(record.magnitude),
        }
    }
}

/// Counters produced by [`clean_records`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleaningStats {
    /// Raw records received
    pub received: usize,
    /// Dropped for a missing or non-finite field or a bad timestamp
    pub invalid: usize,
    /// Dropped because an earlier record already had the same timestamp
    pub duplicates: usize,
    /// Records kept
    pub kept: usize,
}

impl CleaningStats {
    /// Total records dropped.
    pub fn dropped(&self) -> usize {
        self.invalid + self.duplicates
    }

    /// Accumulate another batch's counters.
    pub fn merge(&mut self, other: &CleaningStats) {
        self.received += other.received;
        self.invalid += other.invalid;
        self.duplicates += other.duplicates;
        self.kept += other.kept;
    }
}

/// Validate, sort and de-duplicate a batch of raw records.
///
/// Output times are strictly increasing. The sort is stable, so of several
/// records sharing a timestamp the first one received is kept.
pub fn clean_records(raw: Vec<RawRecord>) -> (Vec<Record>, CleaningStats) {
    let received = raw.len();
    let mut records: Vec<Record> = raw.into_iter().filter_map(RawRecord::into_record).collect();
    let invalid = received - records.len();

    records.sort_by_key(|r| r.time);
    let before_dedup = records.len();
    records.dedup_by_key(|r| r.time);
    let duplicates = before_dedup - records.len();

    if invalid > 0 || duplicates > 0 {
        log::debug!(
            "Cleaning dropped {invalid} invalid and {duplicates} duplicate records of {received}"
        );
    }

    let stats = CleaningStats {
        received,
        invalid,
        duplicates,
        kept: records.len(),
    };
    (records, stats)
}

/// Paginated, time-ordered read over an external record store.
///
/// Implementations must return records non-decreasing in time across calls.
/// An empty batch signals end of stream.
pub trait RecordCursor {
    fn next_batch(&mut self, batch_size: usize) -> Result<Vec<RawRecord>>;
}

impl<C: RecordCursor + ?Sized> RecordCursor for &mut C {
    fn next_batch(&mut self, batch_size: usize) -> Result<Vec<RawRecord>> {
        (**self).next_batch(batch_size)
    }
}

impl<C: RecordCursor + ?Sized> RecordCursor for Box<C> {
    fn next_batch(&mut self, batch_size: usize) -> Result<Vec<RawRecord>> {
        (**self).next_batch(batch_size)
    }
}

/// Cursor over records already in memory.
#[derive(Debug, Clone, Default)]
pub struct VecCursor {
    records: Vec<RawRecord>,
    position: usize,
}

impl VecCursor {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            position: 0,
        }
    }

    /// Build from validated records.
    pub fn from_records(records: &[Record]) -> Self {
        Self::new(records.iter().copied().map(RawRecord::from).collect())
    }

    /// Records not yet returned.
    pub fn remaining(&self) -> usize {
        self.records.len() - self.position
    }
}

impl RecordCursor for VecCursor {
    fn next_batch(&mut self, batch_size: usize) -> Result<Vec<RawRecord>> {
        let end = (self.position + batch_size).min(self.records.len());
        let batch = self.records[self.position..end].to_vec();
        self.position = end;
        Ok(batch)
    }
}

/// Cursor over a newline-delimited JSON dump of the event store.
///
/// Blank lines are skipped. Lines that are not UTF-8 or fail to parse are
/// counted and skipped: a malformed document is an invalid record, not a
/// fatal error.
pub struct JsonLinesCursor {
    path: PathBuf,
    reader: BufReader<File>,
    line: Vec<u8>,
    malformed: usize,
}

impl JsonLinesCursor {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = BufReader::new(File::open(&path)?);
        Ok(Self {
            path,
            reader,
            line: Vec::new(),
            malformed: 0,
        })
    }

    /// Lines skipped because they were not valid UTF-8 record JSON.
    pub fn malformed_lines(&self) -> usize {
        self.malformed
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordCursor for JsonLinesCursor {
    fn next_batch(&mut self, batch_size: usize) -> Result<Vec<RawRecord>> {
        let mut batch = Vec::with_capacity(batch_size.min(65_536));
        while batch.len() < batch_size {
            self.line.clear();
            if self.reader.read_until(b'\n', &mut self.line)? == 0 {
                break;
            }
            let line = match std::str::from_utf8(&self.line) {
                Ok(line) => line,
                Err(e) => {
                    self.malformed += 1;
                    log::debug!("Skipping non-UTF-8 line in {}: {e}", self.path.display());
                    continue;
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawRecord>(trimmed) {
                Ok(raw) => batch.push(raw),
                Err(e) => {
                    self.malformed += 1;
                    log::debug!("Skipping malformed line in {}: {e}", self.path.display());
                }
            }
        }
        Ok(batch)
    }
}
