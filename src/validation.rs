//! Record stream validation.
//!
//! Windowing clamps negative time deltas to zero instead of failing, so
//! callers that rely on delta sign should run these checks first.
//!
//! # Validation Categories
//!
//! 1. **Timestamp Ordering**: strictly increasing times, gap detection
//! 2. **Value Ranges**: geographic bounds for latitude/longitude
//!
//! # Usage
//!
//! ```ignore
//! use seismic_dataset::validation::validate_record_times;
//!
//! let result = validate_record_times(&records, 30.0);
//! if result.has_errors() {
//!     for error in result.errors() {
//!         log::error!("{error}");
//!     }
//! }
//! ```

use crate::record::Record;
use std::fmt;

/// Outcome of a single check.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationLevel {
    Valid,
    Warning(String),
    Error(String),
}

impl ValidationLevel {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationLevel::Valid)
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, ValidationLevel::Warning(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ValidationLevel::Error(_))
    }
}

impl fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationLevel::Valid => write!(f, "Valid"),
            ValidationLevel::Warning(msg) => write!(f, "Warning: {msg}"),
            ValidationLevel::Error(msg) => write!(f, "Error: {msg}"),
        }
    }
}

/// Aggregated validation result.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    results: Vec<(String, ValidationLevel)>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validation result.
    pub fn add(&mut self, check_name: &str, level: ValidationLevel) {
        self.results.push((check_name.to_string(), level));
    }

    /// True when no check produced a warning or an error.
    pub fn is_valid(&self) -> bool {
        self.results.iter().all(|(_, level)| level.is_valid())
    }

    pub fn has_errors(&self) -> bool {
        self.results.iter().any(|(_, level)| level.is_error())
    }

    pub fn has_warnings(&self) -> bool {
        self.results.iter().any(|(_, level)| level.is_warning())
    }

    /// Warning messages prefixed with their check name.
    pub fn warnings(&self) -> Vec<String> {
        self.results
            .iter()
            .filter_map(|(name, level)| match level {
                ValidationLevel::Warning(msg) => Some(format!("{name}: {msg}")),
                _ => None,
            })
            .collect()
    }

    /// Error messages prefixed with their check name.
    pub fn errors(&self) -> Vec<String> {
        self.results
            .iter()
            .filter_map(|(name, level)| match level {
                ValidationLevel::Error(msg) => Some(format!("{name}: {msg}")),
                _ => None,
            })
            .collect()
    }

    pub fn all_results(&self) -> &[(String, ValidationLevel)] {
        &self.results
    }

    pub fn check_count(&self) -> usize {
        self.results.len()
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|(_, l)| l.is_valid()).count()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let passed = self.passed_count();
        let total = self.check_count();
        writeln!(f, "Validation: {passed}/{total} checks passed")?;

        for (name, level) in &self.results {
            if !level.is_valid() {
                writeln!(f, "  - {name}: {level}")?;
            }
        }

        Ok(())
    }
}

/// Check that record times strictly increase and report large gaps.
///
/// A non-increasing pair is an error (the first one found is reported).
/// A gap longer than `max_gap_days` is a warning.
pub fn validate_record_times(records: &[Record], max_gap_days: f64) -> ValidationResult {
    let mut result = ValidationResult::new();

    if records.is_empty() {
        result.add(
            "record_times",
            ValidationLevel::Warning("No records to validate".to_string()),
        );
        return result;
    }

    let mut ordered = true;
    let mut max_gap = 0.0f64;

    for (i, pair) in records.windows(2).enumerate() {
        let gap = pair[0].days_until(&pair[1]);
        if gap <= 0.0 {
            ordered = false;
            result.add(
                "record_ordering",
                ValidationLevel::Error(format!(
                    "Non-increasing time at index {}: {} after {}",
                    i + 1,
                    pair[1].time,
                    pair[0].time
                )),
            );
            break;
        }
        max_gap = max_gap.max(gap);
    }

    if ordered {
        result.add("record_ordering", ValidationLevel::Valid);
    }

    if max_gap > max_gap_days {
        result.add(
            "record_gaps",
            ValidationLevel::Warning(format!("Max gap between records: {max_gap:.3} days")),
        );
    } else {
        result.add("record_gaps", ValidationLevel::Valid);
    }

    result
}

/// Check latitude/longitude against geographic bounds.
pub fn validate_coordinates(records: &[Record]) -> ValidationResult {
    let mut result = ValidationResult::new();

    let out_of_bounds = records
        .iter()
        .filter(|r| !(-90.0..=90.0).contains(&r.latitude) || !(-180.0..=180.0).contains(&r.longitude))
        .count();

    if out_of_bounds == 0 {
        result.add("coordinates", ValidationLevel::Valid);
    } else {
        result.add(
            "coordinates",
            ValidationLevel::Warning(format!(
                "{out_of_bounds} of {} records outside geographic bounds",
                records.len()
            )),
        );
    }

    result
}
