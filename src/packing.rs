//! Linear packing of physical values into stored integers
//!
//! NetCDF producers such as the CDS store ERA5 fields as 16-bit integers with a
//! per-variable `scale_factor` and `add_offset`:
//!
//! ```text
//! physical = stored * scale_factor + add_offset
//! ```
//!
//! The parameters are chosen per file from the data range of that file, so two
//! downloads of the same variable generally carry different parameters.

/// Packing parameters of a single variable in a single file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackingParams {
    pub scale: f64,
    pub offset: f64,
}

impl PackingParams {
    /// Create packing parameters from a scale factor and an offset
    #[must_use]
    pub const fn new(scale: f64, offset: f64) -> Self {
        Self { scale, offset }
    }

    /// Parameters of an unpacked variable (`scale = 1`, `offset = 0`)
    #[must_use]
    pub const fn identity() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
        }
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// Convert a stored value to its physical value
    #[must_use]
    pub fn unpack(&self, stored: f64) -> f64 {
        stored * self.scale + self.offset
    }

    /// Convert a physical value to the nearest stored integer
    #[must_use]
    pub fn pack(&self, physical: f64) -> i64 {
        #[allow(clippy::cast_possible_truncation)]
        {
            ((physical - self.offset) / self.scale).round() as i64
        }
    }

    /// Unpack a sequence of stored values.
    ///
    /// Values equal to `fill` are missing and become NaN.
    #[must_use]
    pub fn unpack_all(&self, stored: &[f64], fill: Option<f64>) -> Vec<f64> {
        stored
            .iter()
            .map(|&v| match fill {
                Some(fv) if v == fv => f64::NAN,
                _ => self.unpack(v),
            })
            .collect()
    }

    /// Pack a sequence of physical values. NaN becomes `fill` (or 0 without one).
    #[must_use]
    pub fn pack_all(&self, physical: &[f64], fill: Option<i64>) -> Vec<i64> {
        physical
            .iter()
            .map(|&v| {
                if v.is_nan() {
                    fill.unwrap_or(0)
                } else {
                    self.pack(v)
                }
            })
            .collect()
    }

    /// Stored value that decodes to the smallest strictly positive physical value.
    ///
    /// Assumes a positive scale factor.
    #[must_use]
    pub fn smallest_positive_stored(&self) -> f64 {
        let candidate = (-self.offset / self.scale).floor() + 1.0;
        // -offset/scale is rarely exact in binary; step past a zero or negative decode
        if self.unpack(candidate) > 0.0 {
            candidate
        } else {
            candidate + 1.0
        }
    }

    /// Smallest strictly positive physical value representable with these parameters
    #[must_use]
    pub fn smallest_positive(&self) -> f64 {
        self.unpack(self.smallest_positive_stored())
    }
}

impl Default for PackingParams {
    fn default() -> Self {
        Self::identity()
    }
}
