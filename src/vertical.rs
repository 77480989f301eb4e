//! Vertical remapping from pressure levels to a terrain-following sigma grid
//!
//! Each column is cut at the local surface pressure, closed with a surface
//! value and linearly interpolated to the hybrid pressures
//! `p_k = a_k + b_k * surface_pressure`. Below-ground levels never contribute.

use crate::errors::{Era5RadError, Result};
use crate::orography::surface_level_index;
use ndarray::{ArrayD, IxDyn};
use rayon::prelude::*;
use tracing::info;

/// ERA-Interim `a` coefficients (hPa)
pub const ERA_INTERIM_A: [f64; 37] = [
    0.96, 1.81, 2.35, 4.65, 5.76, 8.84, 16.81, 25.80, 49.07, 60.18, 87.65, 103.76, 137.75,
    153.80, 168.19, 180.45, 190.28, 197.55, 204.30, 203.84, 195.84, 188.65, 179.61, 157.06,
    144.11, 130.43, 116.33, 102.10, 88.02, 74.38, 61.44, 49.42, 38.51, 28.88, 20.64, 8.55, 2.10,
];

/// ERA-Interim `b` coefficients (dimensionless)
pub const ERA_INTERIM_B: [f64; 37] = [
    0., 0., 0., 0., 0., 0., 0., 0., 0., 0., 0.00008, 0.00046, 0.00508, 0.01114, 0.02068,
    0.03412, 0.05169, 0.07353, 0.13002, 0.16438, 0.24393, 0.28832, 0.33515, 0.43396, 0.48477,
    0.53571, 0.58617, 0.63555, 0.68327, 0.72879, 0.77160, 0.81125, 0.84737, 0.87966, 0.90788,
    0.95182, 0.97966,
];

/// Hybrid sigma-pressure grid
#[derive(Debug, Clone, PartialEq)]
pub struct SigmaGrid {
    pub a: Vec<f64>,
    pub b: Vec<f64>,
    /// Units of the `a` coefficients
    pub units: String,
}

impl SigmaGrid {
    /// # Errors
    ///
    /// Returns an error if `a` and `b` differ in length or are empty.
    pub fn new(a: Vec<f64>, b: Vec<f64>, units: &str) -> Result<Self> {
        if a.len() != b.len() || a.is_empty() {
            return Err(Era5RadError::InvalidInput {
                message: format!(
                    "sigma coefficients must be non-empty and of equal length (a: {}, b: {})",
                    a.len(),
                    b.len()
                ),
            });
        }
        Ok(Self {
            a,
            b,
            units: units.to_string(),
        })
    }

    pub fn era_interim() -> Self {
        Self {
            a: ERA_INTERIM_A.to_vec(),
            b: ERA_INTERIM_B.to_vec(),
            units: "hPa".to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    /// Target pressures for one column. `a_factor` converts `a` into the surface pressure units.
    pub fn pressures(&self, surface_pressure: f64, a_factor: f64) -> Vec<f64> {
        self.a
            .iter()
            .zip(&self.b)
            .map(|(&a, &b)| a * a_factor + b * surface_pressure)
            .collect()
    }
}

/// Linear interpolation of `values` given at ascending `pressures` onto `targets`.
///
/// Targets outside the known pressures (or NaN) take `fill`.
pub fn remap_column(values: &[f64], pressures: &[f64], targets: &[f64], fill: f64) -> Vec<f64> {
    targets
        .iter()
        .map(|&target| {
            let (Some(&lowest), Some(&highest)) = (pressures.first(), pressures.last()) else {
                return fill;
            };
            if target.is_nan() || target < lowest || target > highest {
                return fill;
            }
            let upper = pressures.partition_point(|&p| p < target);
            if upper == 0 {
                return values[0];
            }
            if pressures[upper] == target {
                return values[upper];
            }
            let (p0, p1) = (pressures[upper - 1], pressures[upper]);
            let (v0, v1) = (values[upper - 1], values[upper]);
            v0 + (v1 - v0) * (target - p0) / (p1 - p0)
        })
        .collect()
}

/// Remapped field with the pressure axis replaced by a sigma axis
#[derive(Debug, Clone)]
pub struct RemapResult {
    /// Pressure of every sigma level at every column
    pub pressure: ArrayD<f64>,
    pub values: ArrayD<f64>,
}

/// Remap a field on pressure levels onto `grid`.
///
/// `levels` are the pressures along `level_axis` in ascending order and in the
/// units of `surface_pressure`, whose shape is the field shape without the level
/// axis. `surface_values`, when given, closes each column at the surface;
/// otherwise the lowest above-ground value is repeated. `a_factor` converts the
/// grid's `a` coefficients into the surface pressure units.
///
/// # Errors
///
/// Returns an error on shape mismatches or unsorted levels.
pub fn remap_variable(
    grid: &SigmaGrid,
    values: &ArrayD<f64>,
    level_axis: usize,
    levels: &[f64],
    surface_pressure: &ArrayD<f64>,
    surface_values: Option<&ArrayD<f64>>,
    a_factor: f64,
) -> Result<RemapResult> {
    let ndim = values.ndim();
    if level_axis >= ndim || values.shape()[level_axis] != levels.len() || levels.is_empty() {
        return Err(Era5RadError::InvalidInput {
            message: format!(
                "level axis {} of shape {:?} does not match {} pressure levels",
                level_axis,
                values.shape(),
                levels.len()
            ),
        });
    }
    if levels.windows(2).any(|w| w[0] >= w[1]) {
        return Err(Era5RadError::InvalidInput {
            message: "pressure levels must be strictly ascending".to_string(),
        });
    }

    let mut column_shape = values.shape().to_vec();
    column_shape.remove(level_axis);
    if surface_pressure.shape() != column_shape.as_slice() {
        return Err(Era5RadError::InvalidInput {
            message: format!(
                "surface pressure shape {:?} does not match column shape {:?}",
                surface_pressure.shape(),
                column_shape
            ),
        });
    }
    if let Some(surface) = surface_values {
        if surface.shape() != column_shape.as_slice() {
            return Err(Era5RadError::InvalidInput {
                message: format!(
                    "surface value shape {:?} does not match column shape {:?}",
                    surface.shape(),
                    column_shape
                ),
            });
        }
    }

    // Level axis last, so each column is contiguous
    let forward: Vec<usize> = (0..ndim)
        .filter(|&axis| axis != level_axis)
        .chain(std::iter::once(level_axis))
        .collect();
    let columns: Vec<f64> = values.view().permuted_axes(forward.clone()).iter().copied().collect();
    let sp: Vec<f64> = surface_pressure.iter().copied().collect();
    let surface: Option<Vec<f64>> = surface_values.map(|s| s.iter().copied().collect());

    let nlev = levels.len();
    let ncols = sp.len();
    info!(
        columns = ncols,
        levels = nlev,
        sigma_levels = grid.len(),
        threads = rayon::current_num_threads(),
        "remapping columns to sigma levels"
    );

    let remapped: Vec<(Vec<f64>, Vec<f64>)> = (0..ncols)
        .into_par_iter()
        .map(|i| {
            let column = &columns[i * nlev..(i + 1) * nlev];
            let sp = sp[i];
            let index = surface_level_index(levels, sp);

            let surface_value = match &surface {
                Some(s) => s[i],
                None => column[index.saturating_sub(1)],
            };
            let mut known: Vec<f64> = column[..index].to_vec();
            known.push(surface_value);
            let mut pressures: Vec<f64> = levels[..index].to_vec();
            pressures.push(sp);

            let targets = grid.pressures(sp, a_factor);
            let remapped = remap_column(&known, &pressures, &targets, known[0]);
            (targets, remapped)
        })
        .collect();

    let mut out_shape = column_shape;
    out_shape.push(grid.len());
    let mut pressure = Vec::with_capacity(ncols * grid.len());
    let mut remapped_values = Vec::with_capacity(ncols * grid.len());
    for (p, v) in remapped {
        pressure.extend(p);
        remapped_values.extend(v);
    }

    let mut inverse = vec![0; ndim];
    for (position, &axis) in forward.iter().enumerate() {
        inverse[axis] = position;
    }
    let restore = |data: Vec<f64>| -> Result<ArrayD<f64>> {
        let array = ArrayD::from_shape_vec(IxDyn(&out_shape), data)?;
        Ok(array
            .permuted_axes(inverse.clone())
            .as_standard_layout()
            .to_owned())
    };

    Ok(RemapResult {
        pressure: restore(pressure)?,
        values: restore(remapped_values)?,
    })
}
