//! Fitted scalers for input features and regression targets.
//!
//! Scalers are fitted once on a designated training subset, persisted as
//! JSON and reloaded for every later windowing or inference call. A loaded
//! scaler transforms bit-identically to the one that was saved: only the
//! fitted statistics are stored and every derived quantity is recomputed
//! the same way on both sides.
//!
//! # Scalers
//!
//! ## 1. Min-Max (input features)
//!
//! Maps each feature's observed range onto `feature_range` (default `[0, 1]`):
//! ```text
//! scale  = (hi - lo) / (data_max - data_min)
//! scaled = lo + (x - data_min) * scale
//! ```
//! Values outside the fitted range are not clamped. A constant feature uses
//! a unit range so it maps to `lo`.
//!
//! ## 2. Regression targets
//!
//! Each regression target gets its own single-feature min-max scaler onto
//! `[0, 1]`, fitted by streaming chunk files through [`MinMaxFit`]. The
//! occurrence label is never scaled.
//!
//! # Architecture
//!
//! ```text
//! Scaler (trait)
//!     └── MinMaxScaler  ← MinMaxFit (streaming accumulator)
//! TargetScalers: one optional single-feature MinMaxScaler per regression target
//! ```
//!
//! Every load goes back through the checked constructors, so a corrupt or
//! hand-edited file is an error at load time rather than at batch time.

use crate::error::{DatasetError, Result};
use crate::export::write_atomic;
use crate::labeling::{TargetArrays, TargetKind};
use crate::record::{clean_records, RecordCursor, FEATURE_COUNT};
use ndarray::{Array2, ArrayView2};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Smallest range treated as non-degenerate.
const MIN_SPREAD: f64 = 1e-12;

/// A fitted, read-only transform over fixed-width feature vectors.
pub trait Scaler: Send + Sync {
    /// Width of the feature vectors this scaler was fitted on.
    fn n_features(&self) -> usize;

    /// Scale a single value of feature `feature`.
    fn transform_value(&self, feature: usize, value: f64) -> f64;

    /// Undo [`Scaler::transform_value`].
    fn inverse_transform_value(&self, feature: usize, value: f64) -> f64;

    /// Scale one feature vector.
    fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.check_width(row.len())?;
        Ok(row
            .iter()
            .enumerate()
            .map(|(j, &v)| self.transform_value(j, v))
            .collect())
    }

    /// Undo [`Scaler::transform_row`].
    fn inverse_transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.check_width(row.len())?;
        Ok(row
            .iter()
            .enumerate()
            .map(|(j, &v)| self.inverse_transform_value(j, v))
            .collect())
    }

    /// Scale a `[n_samples, n_features]` matrix.
    fn transform(&self, samples: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.check_width(samples.ncols())?;
        let mut out = samples.to_owned();
        for mut row in out.rows_mut() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = self.transform_value(j, *v);
            }
        }
        Ok(out)
    }

    /// Undo [`Scaler::transform`].
    fn inverse_transform(&self, samples: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.check_width(samples.ncols())?;
        let mut out = samples.to_owned();
        for mut row in out.rows_mut() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = self.inverse_transform_value(j, *v);
            }
        }
        Ok(out)
    }

    #[doc(hidden)]
    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.n_features() {
            return Err(DatasetError::ShapeMismatch(format!(
                "scaler fitted on {} features, got {}",
                self.n_features(),
                width
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Min-Max Scaler
// =============================================================================

/// Per-feature min-max scaler.
///
/// # Example
///
/// ```
/// use seismic_dataset::preprocessing::{MinMaxScaler, Scaler};
/// use ndarray::array;
///
/// let samples = array![[0.0, 10.0], [50.0, 20.0], [100.0, 30.0]];
/// let scaler = MinMaxScaler::fit(samples.view()).unwrap();
///
/// assert_eq!(scaler.transform_value(0, 50.0), 0.5);
/// assert_eq!(scaler.transform_value(1, 30.0), 1.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    data_min: Vec<f64>,
    data_max: Vec<f64>,
    feature_range: (f64, f64),
}

impl MinMaxScaler {
    /// Build from known bounds.
    pub fn from_bounds(data_min: Vec<f64>, data_max: Vec<f64>) -> Result<Self> {
        Self::from_bounds_with_range(data_min, data_max, (0.0, 1.0))
    }

    /// Build from known bounds and a custom output range.
    pub fn from_bounds_with_range(
        data_min: Vec<f64>,
        data_max: Vec<f64>,
        feature_range: (f64, f64),
    ) -> Result<Self> {
        if data_min.len() != data_max.len() || data_min.is_empty() {
            return Err(DatasetError::ShapeMismatch(format!(
                "min/max bounds must be non-empty and equal length ({} vs {})",
                data_min.len(),
                data_max.len()
            )));
        }
        let invalid = |j: &usize| {
            let (lo, hi) = (data_min[*j], data_max[*j]);
            !lo.is_finite() || !hi.is_finite() || lo > hi
        };
        if let Some(j) = (0..data_min.len()).find(invalid) {
            return Err(DatasetError::InvalidConfig(format!(
                "feature {j} has invalid bounds [{}, {}]",
                data_min[j], data_max[j]
            )));
        }
        if !feature_range.0.is_finite()
            || !feature_range.1.is_finite()
            || feature_range.0 >= feature_range.1
        {
            return Err(DatasetError::InvalidConfig(format!(
                "feature_range lower bound {} must be below upper bound {}",
                feature_range.0, feature_range.1
            )));
        }
        Ok(Self {
            data_min,
            data_max,
            feature_range,
        })
    }

    /// Fit on a `[n_samples, n_features]` matrix.
    pub fn fit(samples: ArrayView2<'_, f64>) -> Result<Self> {
        let mut fit = MinMaxFit::new(samples.ncols());
        for row in samples.rows() {
            fit.update(&row.to_vec())?;
        }
        fit.finish()
    }

    pub fn data_min(&self) -> &[f64] {
        &self.data_min
    }

    pub fn data_max(&self) -> &[f64] {
        &self.data_max
    }

    pub fn feature_range(&self) -> (f64, f64) {
        self.feature_range
    }

    #[inline]
    fn scale(&self, feature: usize) -> f64 {
        let range = self.data_max[feature] - self.data_min[feature];
        let range = if range.abs() < MIN_SPREAD { 1.0 } else { range };
        (self.feature_range.1 - self.feature_range.0) / range
    }

    /// Save as JSON.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_json(self, path.as_ref())
    }

    /// Load from JSON. A missing file is [`DatasetError::ScalerMissing`].
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let scaler: Self = load_json(path.as_ref())?;
        Self::from_bounds_with_range(scaler.data_min, scaler.data_max, scaler.feature_range)
    }
}

impl Scaler for MinMaxScaler {
    fn n_features(&self) -> usize {
        self.data_min.len()
    }

    #[inline]
    fn transform_value(&self, feature: usize, value: f64) -> f64 {
        self.feature_range.0 + (value - self.data_min[feature]) * self.scale(feature)
    }

    #[inline]
    fn inverse_transform_value(&self, feature: usize, value: f64) -> f64 {
        (value - self.feature_range.0) / self.scale(feature) + self.data_min[feature]
    }
}

/// Streaming accumulator for [`MinMaxScaler`].
#[derive(Debug, Clone)]
pub struct MinMaxFit {
    min: Vec<f64>,
    max: Vec<f64>,
    count: u64,
}

impl MinMaxFit {
    pub fn new(n_features: usize) -> Self {
        Self {
            min: vec![f64::INFINITY; n_features],
            max: vec![f64::NEG_INFINITY; n_features],
            count: 0,
        }
    }

    /// Fold one feature vector into the running bounds.
    pub fn update(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.min.len() {
            return Err(DatasetError::ShapeMismatch(format!(
                "expected {} features, got {}",
                self.min.len(),
                row.len()
            )));
        }
        for (j, &v) in row.iter().enumerate() {
            self.min[j] = self.min[j].min(v);
            self.max[j] = self.max[j].max(v);
        }
        self.count += 1;
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Freeze into a scaler. Fails if nothing was seen.
    pub fn finish(self) -> Result<MinMaxScaler> {
        if self.count == 0 {
            return Err(DatasetError::EmptyDataset(
                "cannot fit a min-max scaler on zero samples".to_string(),
            ));
        }
        MinMaxScaler::from_bounds(self.min, self.max)
    }
}

// =============================================================================
// Target Scalers
// =============================================================================

/// One optional scaler per regression target.
///
/// The occurrence label is a classification target and is never scaled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetScalers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<MinMaxScaler>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<MinMaxScaler>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<MinMaxScaler>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_delta: Option<MinMaxScaler>,
}

impl TargetScalers {
    /// Scaler for `kind`, if any. Always `None` for the occurrence label.
    pub fn get(&self, kind: TargetKind) -> Option<&MinMaxScaler> {
        match kind {
            TargetKind::Occurrence => None,
            TargetKind::Magnitude => self.magnitude.as_ref(),
            TargetKind::Latitude => self.latitude.as_ref(),
            TargetKind::Longitude => self.longitude.as_ref(),
            TargetKind::TimeDelta => self.time_delta.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        TargetKind::REGRESSION.iter().all(|&k| self.get(k).is_none())
    }

    /// Scale a raw target value. Identity when no scaler is set for `kind`.
    #[inline]
    pub fn transform_value(&self, kind: TargetKind, value: f64) -> f64 {
        match self.get(kind) {
            Some(s) => s.transform_value(0, value),
            None => value,
        }
    }

    /// Map a model output back to physical units.
    #[inline]
    pub fn inverse_transform_value(&self, kind: TargetKind, value: f64) -> f64 {
        match self.get(kind) {
            Some(s) => s.inverse_transform_value(0, value),
            None => value,
        }
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_json(self, path.as_ref())
    }

    /// Load from JSON, rejecting any scaler that is not a valid
    /// single-feature min-max scaler.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let loaded: Self = load_json(path.as_ref())?;
        Ok(Self {
            magnitude: checked_target(TargetKind::Magnitude, loaded.magnitude)?,
            latitude: checked_target(TargetKind::Latitude, loaded.latitude)?,
            longitude: checked_target(TargetKind::Longitude, loaded.longitude)?,
            time_delta: checked_target(TargetKind::TimeDelta, loaded.time_delta)?,
        })
    }
}

fn checked_target(
    kind: TargetKind,
    scaler: Option<MinMaxScaler>,
) -> Result<Option<MinMaxScaler>> {
    let Some(scaler) = scaler else {
        return Ok(None);
    };
    if scaler.n_features() != 1 {
        return Err(DatasetError::ShapeMismatch(format!(
            "target scaler for {} must have 1 feature, got {}",
            kind.name(),
            scaler.n_features()
        )));
    }
    let checked =
        MinMaxScaler::from_bounds_with_range(scaler.data_min, scaler.data_max, scaler.feature_range)?;
    Ok(Some(checked))
}

/// Streaming fit of all four regression-target scalers.
#[derive(Debug, Clone)]
pub struct TargetScalersFit {
    fits: [MinMaxFit; 4],
}

impl Default for TargetScalersFit {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetScalersFit {
    pub fn new() -> Self {
        Self {
            fits: std::array::from_fn(|_| MinMaxFit::new(1)),
        }
    }

    /// Fold the regression targets of one batch or chunk.
    pub fn update(&mut self, targets: &TargetArrays) -> Result<()> {
        for (fit, kind) in self.fits.iter_mut().zip(TargetKind::REGRESSION) {
            if let Some(values) = targets.regression(kind) {
                for &v in values.iter() {
                    fit.update(&[v as f64])?;
                }
            }
        }
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.fits[0].count()
    }

    pub fn finish(self) -> Result<TargetScalers> {
        let [magnitude, latitude, longitude, time_delta] = self.fits;
        Ok(TargetScalers {
            magnitude: Some(magnitude.finish()?),
            latitude: Some(latitude.finish()?),
            longitude: Some(longitude.finish()?),
            time_delta: Some(time_delta.finish()?),
        })
    }
}

// =============================================================================
// Persistence and the ensure-scaler step
// =============================================================================

/// How [`ensure_feature_scaler`] obtained its scaler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalerOrigin {
    Loaded,
    Fitted,
}

/// Load the feature scaler at `path`, or fit and persist one.
///
/// When the file is absent and `fit_if_missing` is set, the cursor is
/// drained in `batch_size` batches, each batch is cleaned, and the scaler is
/// fitted on every kept record. Refitting an existing scaler is a separate,
/// explicit operation: delete the file or call [`MinMaxScaler::fit`].
pub fn ensure_feature_scaler<C: RecordCursor>(
    path: &Path,
    fit_cursor: &mut C,
    batch_size: usize,
    fit_if_missing: bool,
) -> Result<(MinMaxScaler, ScalerOrigin)> {
    if path.exists() {
        log::info!("Loading feature scaler from {}", path.display());
        return Ok((MinMaxScaler::load_json(path)?, ScalerOrigin::Loaded));
    }
    if !fit_if_missing {
        return Err(DatasetError::ScalerMissing {
            path: path.to_path_buf(),
        });
    }

    log::info!("Fitting new feature scaler, will save to {}", path.display());
    let mut fit = MinMaxFit::new(FEATURE_COUNT);
    loop {
        let raw = fit_cursor.next_batch(batch_size)?;
        if raw.is_empty() {
            break;
        }
        let (records, _) = clean_records(raw);
        for record in &records {
            fit.update(&record.features())?;
        }
    }
    log::info!("Feature scaler fitted on {} records", fit.count());

    let scaler = fit.finish()?;
    scaler.save_json(path)?;
    Ok((scaler, ScalerOrigin::Fitted))
}

fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json)
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(DatasetError::ScalerMissing {
            path: path.to_path_buf(),
        });
    }
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
