//! Below-ground pressure levels
//!
//! Pressure-level products provide every level at every grid point, including
//! levels with a pressure greater than the local surface pressure. Over
//! mountains those levels lie inside the terrain and their values are
//! extrapolations with no physical meaning.

use ndarray::ArrayViewD;
use std::fmt;

/// A pressure level lying below the surface at one grid point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaskedLevel {
    /// Row-major flat index into the surface pressure grid
    pub grid_point: usize,
    pub level_index: usize,
}

/// Every (grid point, level) pair whose level pressure exceeds the surface pressure.
///
/// `pressure_levels` and `surface_pressure` must use the same units. Grid points
/// with a NaN surface pressure are skipped. A level exactly at the surface is valid.
pub fn check_orography_masking<'a>(
    pressure_levels: &'a [f64],
    surface_pressure: ArrayViewD<'a, f64>,
) -> impl Iterator<Item = MaskedLevel> + 'a {
    surface_pressure
        .into_iter()
        .enumerate()
        .filter(|(_, sp)| !sp.is_nan())
        .flat_map(move |(grid_point, &sp)| {
            pressure_levels
                .iter()
                .enumerate()
                .filter(move |&(_, &level)| level > sp)
                .map(move |(level_index, _)| MaskedLevel {
                    grid_point,
                    level_index,
                })
        })
}

/// Index of the first level with a pressure at or below ground (`>= surface_pressure`).
///
/// `pressure_levels` must be sorted ascending (top of atmosphere first). Returns
/// `pressure_levels.len()` when every level is above ground.
pub fn surface_level_index(pressure_levels: &[f64], surface_pressure: f64) -> usize {
    pressure_levels.partition_point(|&p| p < surface_pressure)
}

/// Advisory summary of an orography masking run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrographyMaskWarning {
    pub masked_pairs: usize,
    pub affected_grid_points: usize,
    pub total_grid_points: usize,
}

impl OrographyMaskWarning {
    /// Summarise masked pairs, `None` when nothing is below ground
    pub fn from_masked(
        masked: impl IntoIterator<Item = MaskedLevel>,
        total_grid_points: usize,
    ) -> Option<Self> {
        let mut masked_pairs = 0;
        let mut affected = std::collections::HashSet::new();
        for level in masked {
            masked_pairs += 1;
            affected.insert(level.grid_point);
        }
        if masked_pairs == 0 {
            return None;
        }
        Some(Self {
            masked_pairs,
            affected_grid_points: affected.len(),
            total_grid_points,
        })
    }
}

impl fmt::Display for OrographyMaskWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (grid point, level) pairs below the surface at {} of {} grid points",
            self.masked_pairs, self.affected_grid_points, self.total_grid_points
        )
    }
}
