//! Plausibility checks on physical values
//!
//! Unpacking integer-encoded fields can produce small negative values for
//! quantities that are non-negative by nature (albedos, downward fluxes,
//! humidities). These functions report such values and, on request, replace
//! them with the smallest positive value the packing can represent.

use crate::packing::PackingParams;
use serde::Deserialize;
use std::fmt;

/// Closed range of physically meaningful values. A missing bound is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidRange {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl ValidRange {
    #[must_use]
    pub const fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub const fn non_negative() -> Self {
        Self {
            min: Some(0.0),
            max: None,
        }
    }

    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            min: None,
            max: None,
        }
    }

    /// Whether `value` lies inside the range. NaN is treated as missing, not invalid.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        if value.is_nan() {
            return true;
        }
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

impl fmt::Display for ValidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lower = self.min.map_or("-inf".to_string(), |v| v.to_string());
        let upper = self.max.map_or("+inf".to_string(), |v| v.to_string());
        write!(f, "[{lower}, {upper}]")
    }
}

/// Lazy iterator over the indices of out-of-range values.
///
/// Cloning restarts the scan from the clone's position; [`detect_non_physical`]
/// always starts at index 0.
#[derive(Debug, Clone)]
pub struct NonPhysicalIndices<'a> {
    values: &'a [f64],
    range: ValidRange,
    position: usize,
}

impl Iterator for NonPhysicalIndices<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.position < self.values.len() {
            let index = self.position;
            self.position += 1;
            if !self.range.contains(self.values[index]) {
                return Some(index);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.values.len() - self.position))
    }
}

/// Indices of `values` lying outside `valid_range`. Reports only, never corrects.
pub fn detect_non_physical(values: &[f64], valid_range: ValidRange) -> NonPhysicalIndices<'_> {
    NonPhysicalIndices {
        values,
        range: valid_range,
        position: 0,
    }
}

/// Advisory summary of a [`detect_non_physical`] scan
#[derive(Debug, Clone, PartialEq)]
pub struct NonPhysicalValueWarning {
    pub variable: String,
    pub range: ValidRange,
    pub count: usize,
    pub first_index: usize,
    /// Offending value farthest from the range
    pub worst_value: f64,
}

impl NonPhysicalValueWarning {
    /// Scan `values` and summarise the result, `None` when every value is in range
    pub fn from_scan(variable: &str, values: &[f64], range: ValidRange) -> Option<Self> {
        let mut indices = detect_non_physical(values, range);
        let first_index = indices.next()?;

        let distance = |v: f64| {
            let below = range.min.map_or(0.0, |min| min - v);
            let above = range.max.map_or(0.0, |max| v - max);
            below.max(above)
        };

        let mut count = 1;
        let mut worst_value = values[first_index];
        for index in indices {
            count += 1;
            if distance(values[index]) > distance(worst_value) {
                worst_value = values[index];
            }
        }

        Some(Self {
            variable: variable.to_string(),
            range,
            count,
            first_index,
            worst_value,
        })
    }
}

impl fmt::Display for NonPhysicalValueWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} value(s) of '{}' outside {} (first at index {}, worst {})",
            self.count, self.variable, self.range, self.first_index, self.worst_value
        )
    }
}

/// Replace stored values that decode to a negative physical value.
///
/// The replacement is the stored value of [`PackingParams::smallest_positive`].
/// Fill values are left untouched. Returns the number of replaced values.
pub fn clamp_negatives(stored: &mut [f64], packing: PackingParams, fill: Option<f64>) -> usize {
    let replacement = packing.smallest_positive_stored();
    let mut replaced = 0;
    for value in stored.iter_mut() {
        if fill.map_or(false, |fv| *value == fv) {
            continue;
        }
        if packing.unpack(*value) < 0.0 {
            *value = replacement;
            replaced += 1;
        }
    }
    replaced
}
