//! Model evaluation over a batch generator.
//!
//! The model is opaque: a [`SequenceModel`] maps a `(N, L, 4)` input tensor
//! to one prediction per target. [`evaluate`] runs it over every batch of a
//! generator and accumulates:
//!
//! - occurrence accuracy and a 2x2 confusion matrix at threshold 0.5
//! - mean absolute error per regression target
//!
//! When the generator scales its targets, both predictions and targets are
//! mapped back through the inverse scalers first, so errors are reported in
//! physical units (magnitude, degrees, days).

use crate::dataset::SequenceSource;
use crate::error::{DatasetError, Result};
use crate::generator::BatchGenerator;
use crate::labeling::{TargetArrays, TargetKind};
use crate::preprocessing::TargetScalers;
use ndarray::{Array1, Array3};
use serde::{Deserialize, Serialize};

/// Decision threshold on the occurrence probability.
pub const OCCURRENCE_THRESHOLD: f32 = 0.5;

/// Model outputs for one batch, in target order.
#[derive(Debug, Clone, PartialEq)]
pub struct Predictions {
    /// Probability that the next record is an event
    pub occurrence: Array1<f32>,
    pub magnitude: Array1<f32>,
    pub latitude: Array1<f32>,
    pub longitude: Array1<f32>,
    pub time_delta: Array1<f32>,
}

impl Predictions {
    pub fn new(
        occurrence: Array1<f32>,
        magnitude: Array1<f32>,
        latitude: Array1<f32>,
        longitude: Array1<f32>,
        time_delta: Array1<f32>,
    ) -> Result<Self> {
        let n = occurrence.len();
        let lengths = [
            magnitude.len(),
            latitude.len(),
            longitude.len(),
            time_delta.len(),
        ];
        if lengths.iter().any(|&len| len != n) {
            return Err(DatasetError::ShapeMismatch(format!(
                "prediction lengths differ: occurrence {n}, regression {lengths:?}"
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

    pub fn len(&self) -> usize {
        self.occurrence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occurrence.is_empty()
    }

    /// Regression output for `kind`; `None` for the occurrence head.
    pub fn regression(&self, kind: TargetKind) -> Option<&Array1<f32>> {
        match kind {
            TargetKind::Occurrence => None,
            TargetKind::Magnitude => Some(&self.magnitude),
            TargetKind::Latitude => Some(&self.latitude),
            TargetKind::Longitude => Some(&self.longitude),
            TargetKind::TimeDelta => Some(&self.time_delta),
        }
    }
}

/// A trained model treated as a black box.
pub trait SequenceModel {
    /// Predict all five targets for a `(N, L, 4)` batch of scaled inputs.
    fn predict(&self, inputs: &Array3<f32>) -> Result<Predictions>;
}

impl<M: SequenceModel + ?Sized> SequenceModel for &M {
    fn predict(&self, inputs: &Array3<f32>) -> Result<Predictions> {
        (**self).predict(inputs)
    }
}

/// Binary confusion matrix for the occurrence head.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn record(&mut self, actual: bool, predicted: bool) {
        match (actual, predicted) {
            (false, false) => self.true_negative += 1,
            (false, true) => self.false_positive += 1,
            (true, false) => self.false_negative += 1,
            (true, true) => self.true_positive += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }

    /// Fraction of correct predictions, 0 when empty.
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.true_negative + self.true_positive) as f64 / total as f64
    }

    /// Rows are actual class, columns predicted class.
    pub fn as_matrix(&self) -> [[usize; 2]; 2] {
        [
            [self.true_negative, self.false_positive],
            [self.false_negative, self.true_positive],
        ]
    }
}

/// Aggregate metrics from [`evaluate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub n_sequences: usize,
    pub n_batches: usize,
    pub confusion: ConfusionMatrix,
    /// Mean absolute error in [`TargetKind::REGRESSION`] order
    pub mean_absolute_error: [f64; 4],
    /// Errors were computed after inverse target scaling
    pub physical_units: bool,
}

impl EvaluationReport {
    pub fn accuracy(&self) -> f64 {
        self.confusion.accuracy()
    }

    /// Mean absolute error for a regression target.
    pub fn mae(&self, kind: TargetKind) -> Option<f64> {
        TargetKind::REGRESSION
            .iter()
            .position(|&k| k == kind)
            .map(|i| self.mean_absolute_error[i])
    }
}

/// Run `model` over every batch of `generator` in its current order.
pub fn evaluate<S, M>(model: &M, generator: &BatchGenerator<S>) -> Result<EvaluationReport>
where
    S: SequenceSource,
    M: SequenceModel + ?Sized,
{
    let scalers = generator.target_scalers().filter(|s| !s.is_empty());
    let mut confusion = ConfusionMatrix::default();
    let mut abs_error_sums = [0.0f64; 4];
    let mut n_sequences = 0;

    for index in 0..generator.len() {
        let batch = generator.get_batch(index)?;
        let predictions = model.predict(&batch.inputs)?;
        if predictions.len() != batch.len() {
            return Err(DatasetError::ShapeMismatch(format!(
                "model returned {} predictions for batch {index} of {} sequences",
                predictions.len(),
                batch.len()
            )));
        }

        for (&actual, &p) in batch
            .targets
            .occurrence
            .iter()
            .zip(predictions.occurrence.iter())
        {
            confusion.record(actual > 0, p >= OCCURRENCE_THRESHOLD);
        }
        accumulate_abs_errors(&mut abs_error_sums, &batch.targets, &predictions, scalers);
        n_sequences += batch.len();
    }

    let mean_absolute_error = abs_error_sums.map(|sum| {
        if n_sequences == 0 {
            0.0
        } else {
            sum / n_sequences as f64
        }
    });

    let report = EvaluationReport {
        n_sequences,
        n_batches: generator.len(),
        confusion,
        mean_absolute_error,
        physical_units: scalers.is_some(),
    };
    log::info!(
        "Evaluated {} sequences: accuracy {:.4}, MAE {:?}",
        report.n_sequences,
        report.accuracy(),
        report.mean_absolute_error
    );
    Ok(report)
}

fn accumulate_abs_errors(
    sums: &mut [f64; 4],
    targets: &TargetArrays,
    predictions: &Predictions,
    scalers: Option<&TargetScalers>,
) {
    for (sum, kind) in sums.iter_mut().zip(TargetKind::REGRESSION) {
        let (Some(actual), Some(predicted)) = (targets.regression(kind), predictions.regression(kind))
        else {
            continue;
        };
        for (&a, &p) in actual.iter().zip(predicted.iter()) {
            let (a, p) = match scalers {
                Some(s) => (
                    s.inverse_transform_value(kind, a as f64),
                    s.inverse_transform_value(kind, p as f64),
                ),
                None => (a as f64, p as f64),
            };
            *sum += (a - p).abs();
        }
    }
}
