//! Units conversion for pressure coordinates and surface fields

use crate::errors::{Era5RadError, Result};
use std::ops::{Div, Mul};

/// Exponents of the SI base quantities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dimensions {
    pub current: i8,
    pub distance: i8,
    pub intensity: i8,
    pub mass: i8,
    pub mole: i8,
    pub temperature: i8,
    pub time: i8,
}

impl Dimensions {
    pub const DISTANCE: Self = Self::base(0, 1, 0, 0, 0, 0, 0);
    pub const MASS: Self = Self::base(0, 0, 0, 1, 0, 0, 0);
    pub const TEMPERATURE: Self = Self::base(0, 0, 0, 0, 0, 1, 0);
    pub const TIME: Self = Self::base(0, 0, 0, 0, 0, 0, 1);

    const fn base(
        current: i8,
        distance: i8,
        intensity: i8,
        mass: i8,
        mole: i8,
        temperature: i8,
        time: i8,
    ) -> Self {
        Self {
            current,
            distance,
            intensity,
            mass,
            mole,
            temperature,
            time,
        }
    }

    /// Force per area
    pub fn pressure() -> Self {
        let velocity = Self::DISTANCE / Self::TIME;
        let force = Self::MASS * (velocity / Self::TIME);
        force / (Self::DISTANCE * Self::DISTANCE)
    }
}

impl Mul for Dimensions {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self {
            current: self.current + rhs.current,
            distance: self.distance + rhs.distance,
            intensity: self.intensity + rhs.intensity,
            mass: self.mass + rhs.mass,
            mole: self.mole + rhs.mole,
            temperature: self.temperature + rhs.temperature,
            time: self.time + rhs.time,
        }
    }
}

impl Div for Dimensions {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        Self {
            current: self.current - rhs.current,
            distance: self.distance - rhs.distance,
            intensity: self.intensity - rhs.intensity,
            mass: self.mass - rhs.mass,
            mole: self.mole - rhs.mole,
            temperature: self.temperature - rhs.temperature,
            time: self.time - rhs.time,
        }
    }
}

/// A named unit: its spellings, factor to SI and dimensions
#[derive(Debug, Clone)]
pub struct Conversion {
    pub aliases: Vec<&'static str>,
    pub factor: f64,
    pub dimensions: Dimensions,
}

impl Conversion {
    fn matches(&self, units: &str) -> bool {
        let units = units.trim();
        self.aliases.iter().any(|alias| *alias == units)
    }
}

/// Table driven converter between compatible units
#[derive(Debug, Clone)]
pub struct UnitsConverter {
    pub units: Vec<Conversion>,
}

impl UnitsConverter {
    pub fn new(units: Vec<Conversion>) -> Self {
        Self { units }
    }

    /// Factor and dimensions converting `units` to SI
    pub fn to_si(&self, units: &str) -> Result<(f64, Dimensions)> {
        self.units
            .iter()
            .find(|c| c.matches(units))
            .map(|c| (c.factor, c.dimensions))
            .ok_or_else(|| Era5RadError::UnitsError {
                message: format!("{units} not found in converter"),
            })
    }

    /// Multiplicative factor converting values in `source` units to `destination` units
    ///
    /// # Errors
    ///
    /// Returns [`Era5RadError::UnitsError`] for unknown or incompatible units.
    pub fn convert(&self, source: &str, destination: &str) -> Result<f64> {
        let (to_si, from_dims) = self.to_si(source)?;
        let (from_si, to_dims) = self.to_si(destination)?;
        if from_dims != to_dims {
            return Err(Era5RadError::UnitsError {
                message: format!("Cannot convert {source} to {destination}"),
            });
        }
        Ok(to_si / from_si)
    }

    /// Whether `units` names a pressure unit known to this converter
    pub fn is_pressure(&self, units: &str) -> bool {
        self.to_si(units)
            .map_or(false, |(_, dims)| dims == Dimensions::pressure())
    }
}

impl Default for UnitsConverter {
    fn default() -> Self {
        let pressure = Dimensions::pressure();
        Self::new(vec![
            Conversion {
                aliases: vec!["m", "meter", "meters", "Meter", "Meters"],
                factor: 1.0,
                dimensions: Dimensions::DISTANCE,
            },
            Conversion {
                aliases: vec!["atm", "atmosphere", "atmospheres", "Atmosphere", "Atmospheres"],
                factor: 101_325.0,
                dimensions: pressure,
            },
            Conversion {
                aliases: vec!["bar", "bars", "Bar", "Bars"],
                factor: 100_000.0,
                dimensions: pressure,
            },
            Conversion {
                aliases: vec!["dbar", "decibar", "decibars", "Decibar", "Decibars"],
                factor: 10_000.0,
                dimensions: pressure,
            },
            Conversion {
                aliases: vec![
                    "hPa", "mb", "mbar", "mbars", "Mbar", "millibar", "millibars", "Millibar",
                    "Millibars",
                ],
                factor: 100.0,
                dimensions: pressure,
            },
            Conversion {
                aliases: vec!["Pa", "pascal", "pascals", "Pascal", "Pascals"],
                factor: 1.0,
                dimensions: pressure,
            },
            Conversion {
                aliases: vec!["K"],
                factor: 1.0,
                dimensions: Dimensions::TEMPERATURE,
            },
        ])
    }
}
