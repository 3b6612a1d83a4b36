//! Target generation for seismic sequence prediction.
//!
//! Every training sequence carries five targets taken from the record right
//! after the window (the *target record*) and the record after that (the
//! *lookahead record*):
//!
//! | Target | Key | Chunk array | Source |
//! |--------|-----|-------------|--------|
//! | Occurrence | `event_occurred` | `y_class` | `1` if target magnitude > 0, else `0` |
//! | Magnitude | `magnitude` | `y_mag` | target magnitude |
//! | Latitude | `location_lat` | `y_lat` | target latitude |
//! | Longitude | `location_lon` | `y_lon` | target longitude |
//! | Time delta | `time_delta` | `y_time` | `max(0, lookahead.time - target.time)` in days |
//!
//! Only the occurrence label is a classification target. The other four are
//! regression targets and may be scaled by
//! [`TargetScalers`](crate::preprocessing::TargetScalers).

use crate::error::{DatasetError, Result};
use crate::record::Record;
use ndarray::{Array1, Axis};
use serde::{Deserialize, Serialize};

/// The five prediction targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Occurrence,
    Magnitude,
    Latitude,
    Longitude,
    TimeDelta,
}

impl TargetKind {
    /// All targets in model output order.
    pub const ALL: [TargetKind; 5] = [
        TargetKind::Occurrence,
        TargetKind::Magnitude,
        TargetKind::Latitude,
        TargetKind::Longitude,
        TargetKind::TimeDelta,
    ];

    /// The scalable regression targets.
    pub const REGRESSION: [TargetKind; 4] = [
        TargetKind::Magnitude,
        TargetKind::Latitude,
        TargetKind::Longitude,
        TargetKind::TimeDelta,
    ];

    /// Key used in model inputs and outputs.
    pub fn name(&self) -> &'static str {
        match self {
            TargetKind::Occurrence => "event_occurred",
            TargetKind::Magnitude => "magnitude",
            TargetKind::Latitude => "location_lat",
            TargetKind::Longitude => "location_lon",
            TargetKind::TimeDelta => "time_delta",
        }
    }

    /// Array name inside a chunk file.
    pub fn chunk_key(&self) -> &'static str {
        match self {
            TargetKind::Occurrence => "y_class",
            TargetKind::Magnitude => "y_mag",
            TargetKind::Latitude => "y_lat",
            TargetKind::Longitude => "y_lon",
            TargetKind::TimeDelta => "y_time",
        }
    }

    pub fn is_regression(&self) -> bool {
        !matches!(self, TargetKind::Occurrence)
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Targets of a single sequence, in physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetTuple {
    pub occurred: u8,
    pub magnitude: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Always `>= 0`.
    pub time_delta_days: f64,
}

impl TargetTuple {
    /// Build from the target record and the record after it.
    ///
    /// An out-of-order lookahead yields a zero delta.
    pub fn from_records(target: &Record, lookahead: &Record) -> Self {
        Self {
            occurred: u8::from(target.magnitude > 0.0),
            magnitude: target.magnitude,
            latitude: target.latitude,
            longitude: target.longitude,
            time_delta_days: target.days_until(lookahead).max(0.0),
        }
    }
}

/// Column-oriented targets for `n` sequences.
///
/// All five arrays always have the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetArrays {
    pub occurrence: Array1<u8>,
    pub magnitude: Array1<f32>,
    pub latitude: Array1<f32>,
    pub longitude: Array1<f32>,
    pub time_delta: Array1<f32>,
}

impl TargetArrays {
    /// Assemble from columns, checking they agree in length.
    pub fn new(
        occurrence: Array1<u8>,
        magnitude: Array1<f32>,
        latitude: Array1<f32>,
        longitude: Array1<f32>,
        time_delta: Array1<f32>,
    ) -> Result<Self> {
        let n = occurrence.len();
        let lens = [magnitude.len(), latitude.len(), longitude.len(), time_delta.len()];
        if lens.iter().any(|&l| l != n) {
            return Err(DatasetError::ShapeMismatch(format!(
                "target arrays disagree in length: y_class={n}, others={lens:?}"
            )));
        }
        Ok(Self {
            occurrence,
            magnitude,
            latitude,
            longitude,
            time_delta,
        })
    }

    pub fn from_tuples(tuples: &[TargetTuple]) -> Self {
        Self {
            occurrence: tuples.iter().map(|t| t.occurred).collect(),
            magnitude: tuples.iter().map(|t| t.magnitude as f32).collect(),
            latitude: tuples.iter().map(|t| t.latitude as f32).collect(),
            longitude: tuples.iter().map(|t| t.longitude as f32).collect(),
            time_delta: tuples.iter().map(|t| t.time_delta_days as f32).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.occurrence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occurrence.is_empty()
    }

    /// Column for a regression target, `None` for the occurrence label.
    pub fn regression(&self, kind: TargetKind) -> Option<&Array1<f32>> {
        match kind {
            TargetKind::Occurrence => None,
            TargetKind::Magnitude => Some(&self.magnitude),
            TargetKind::Latitude => Some(&self.latitude),
            TargetKind::Longitude => Some(&self.longitude),
            TargetKind::TimeDelta => Some(&self.time_delta),
        }
    }

    pub fn regression_mut(&mut self, kind: TargetKind) -> Option<&mut Array1<f32>> {
        match kind {
            TargetKind::Occurrence => None,
            TargetKind::Magnitude => Some(&mut self.magnitude),
            TargetKind::Latitude => Some(&mut self.latitude),
            TargetKind::Longitude => Some(&mut self.longitude),
            TargetKind::TimeDelta => Some(&mut self.time_delta),
        }
    }

    /// Rows at `indices`, in that order. Indices may repeat.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            occurrence: self.occurrence.select(Axis(0), indices),
            magnitude: self.magnitude.select(Axis(0), indices),
            latitude: self.latitude.select(Axis(0), indices),
            longitude: self.longitude.select(Axis(0), indices),
            time_delta: self.time_delta.select(Axis(0), indices),
        }
    }

    /// Targets of row `i`.
    pub fn row(&self, i: usize) -> Option<TargetTuple> {
        if i >= self.len() {
            return None;
        }
        Some(TargetTuple {
            occurred: self.occurrence[i],
            magnitude: self.magnitude[i] as f64,
            latitude: self.latitude[i] as f64,
            longitude: self.longitude[i] as f64,
            time_delta_days: self.time_delta[i] as f64,
        })
    }

    pub fn occurrence_stats(&self) -> OccurrenceStats {
        OccurrenceStats::from_labels(self.occurrence.iter().copied())
    }
}

/// Class counts of the occurrence label.
///
/// # Example
///
/// ```
/// use seismic_dataset::labeling::OccurrenceStats;
///
/// let stats = OccurrenceStats::from_labels([1, 0, 0, 0]);
/// assert_eq!(stats.occurred, 1);
/// assert_eq!(stats.not_occurred, 3);
/// assert!(stats.has_both_classes());
/// assert_eq!(stats.majority_count(), 3);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccurrenceStats {
    /// Number of labels
    pub total: usize,
    /// Labels equal to 1
    pub occurred: usize,
    /// Labels equal to 0
    pub not_occurred: usize,
}

impl OccurrenceStats {
    /// Count labels. Any non-zero label counts as an occurrence.
    pub fn from_labels<I: IntoIterator<Item = u8>>(labels: I) -> Self {
        let mut stats = Self::default();
        for label in labels {
            stats.total += 1;
            if label != 0 {
                stats.occurred += 1;
            } else {
                stats.not_occurred += 1;
            }
        }
        stats
    }

    pub fn merge(&mut self, other: &OccurrenceStats) {
        self.total += other.total;
        self.occurred += other.occurred;
        self.not_occurred += other.not_occurred;
    }

    pub fn has_both_classes(&self) -> bool {
        self.occurred > 0 && self.not_occurred > 0
    }

    pub fn majority_count(&self) -> usize {
        self.occurred.max(self.not_occurred)
    }

    pub fn minority_count(&self) -> usize {
        self.occurred.min(self.not_occurred)
    }

    /// Fraction of labels that are occurrences.
    pub fn occurrence_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.occurred as f64 / self.total as f64
    }

    /// Majority / minority. Infinite when a class is absent.
    pub fn imbalance_ratio(&self) -> f64 {
        let minority = self.minority_count();
        if minority == 0 {
            f64::INFINITY
        } else {
            self.majority_count() as f64 / minority as f64
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use ndarray::array;

    fn rec(ms: i64, mag: f64) -> Record {
        Record::new(
            DateTime::<Utc>::from_timestamp_millis(ms).unwrap(),
            35.5,
            139.5,
            12.0,
            mag,
        )
    }

    #[test]
    fn test_target_kind_names() {
        assert_eq!(TargetKind::Occurrence.name(), "event_occurred");
        assert_eq!(TargetKind::TimeDelta.name(), "time_delta");
        assert_eq!(TargetKind::Latitude.chunk_key(), "y_lat");
        assert!(!TargetKind::Occurrence.is_regression());
        assert!(TargetKind::REGRESSION.iter().all(|k| k.is_regression()));
        assert_eq!(format!("{}", TargetKind::Longitude), "location_lon");
    }

    #[test]
    fn test_tuple_from_records() {
        let target = rec(0, 4.2);
        let lookahead = rec(2 * 86_400_000, 3.0);
        let t = TargetTuple::from_records(&target, &lookahead);

        assert_eq!(t.occurred, 1);
        assert_eq!(t.magnitude, 4.2);
        assert_eq!(t.latitude, 35.5);
        assert!((t.time_delta_days - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_tuple_zero_magnitude_and_clamped_delta() {
        let target = rec(86_400_000, 0.0);
        let lookahead = rec(0, 1.0);
        let t = TargetTuple::from_records(&target, &lookahead);

        assert_eq!(t.occurred, 0);
        assert_eq!(t.time_delta_days, 0.0);
    }

    #[test]
    fn test_arrays_length_check() {
        let ok = TargetArrays::new(
            array![1, 0],
            array![1.0, 2.0],
            array![1.0, 2.0],
            array![1.0, 2.0],
            array![1.0, 2.0],
        );
        assert!(ok.is_ok());

        let bad = TargetArrays::new(
            array![1, 0],
            array![1.0],
            array![1.0, 2.0],
            array![1.0, 2.0],
            array![1.0, 2.0],
        );
        assert!(matches!(bad, Err(DatasetError::ShapeMismatch(_))));
    }

    #[test]
    fn test_arrays_select_and_row() {
        let tuples: Vec<TargetTuple> = (0..4)
            .map(|i| TargetTuple {
                occurred: (i % 2) as u8,
                magnitude: i as f64,
                latitude: 10.0 + i as f64,
                longitude: 20.0 + i as f64,
                time_delta_days: 0.5 * i as f64,
            })
            .collect();
        let arrays = TargetArrays::from_tuples(&tuples);
        assert_eq!(arrays.len(), 4);

        let picked = arrays.select(&[3, 0, 3]);
        assert_eq!(picked.magnitude.to_vec(), vec![3.0, 0.0, 3.0]);
        assert_eq!(picked.occurrence.to_vec(), vec![1, 0, 1]);

        let row = arrays.row(2).unwrap();
        assert_eq!(row.latitude, 12.0);
        assert!(arrays.row(4).is_none());
    }

    #[test]
    fn test_occurrence_stats() {
        let stats = OccurrenceStats::from_labels([0, 0, 0, 1]);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.minority_count(), 1);
        assert_eq!(stats.imbalance_ratio(), 3.0);
        assert_eq!(stats.occurrence_rate(), 0.25);

        let empty = OccurrenceStats::from_labels([0, 0]);
        assert!(!empty.has_both_classes());
        assert!(empty.imbalance_ratio().is_infinite());

        let mut merged = stats;
        merged.merge(&empty);
        assert_eq!(merged.total, 6);
        assert_eq!(merged.not_occurred, 5);
    }
}
