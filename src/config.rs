//! Optional TOML configuration
//!
//! ```toml
//! [guard]
//! policy = "fail-on-mismatch"
//!
//! [tools]
//! ncrcat = "/opt/nco/bin/ncrcat"
//!
//! [ranges.alnid]
//! min = 0.0
//! max = 1.0
//!
//! [negatives]
//! skip = ["msnlwrfcs"]
//!
//! [vertical.surface_variables]
//! t = "t2m"
//! q = "q2m"
//!
//! [cds]
//! url = "https://cds.climate.copernicus.eu/api"
//! poll_seconds = 30
//! ```

use crate::errors::{Era5RadError, Result};
use crate::guard::ResolvePolicy;
use crate::plausibility::ValidRange;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Net and top-of-atmosphere fluxes that are legitimately negative
pub const DEFAULT_NEGATIVE_SKIP: [&str; 7] = [
    "msdwlwrfcs",
    "msdwswrfcs",
    "msnlwrfcs",
    "msnswrfcs",
    "mtdwswrf",
    "mtnlwrfcs",
    "mtnswrfcs",
];

/// Top-level configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub guard: GuardConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    /// Valid ranges by variable name
    #[serde(default)]
    pub ranges: HashMap<String, ValidRange>,

    #[serde(default)]
    pub negatives: NegativesConfig,

    #[serde(default)]
    pub vertical: VerticalConfig,

    #[serde(default)]
    pub cds: CdsConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardConfig {
    #[serde(default)]
    pub policy: ResolvePolicy,
}

/// Program names or paths of the external NetCDF tools
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    #[serde(default = "default_ncrcat")]
    pub ncrcat: String,
    #[serde(default = "default_ncpdq")]
    pub ncpdq: String,
    #[serde(default = "default_cdo")]
    pub cdo: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ncrcat: default_ncrcat(),
            ncpdq: default_ncpdq(),
            cdo: default_cdo(),
        }
    }
}

fn default_ncrcat() -> String {
    "ncrcat".to_string()
}
fn default_ncpdq() -> String {
    "ncpdq".to_string()
}
fn default_cdo() -> String {
    "cdo".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NegativesConfig {
    /// Variables never clamped or flagged for being negative
    #[serde(default = "default_skip")]
    pub skip: Vec<String>,
}

impl Default for NegativesConfig {
    fn default() -> Self {
        Self {
            skip: default_skip(),
        }
    }
}

fn default_skip() -> Vec<String> {
    DEFAULT_NEGATIVE_SKIP.iter().map(|s| s.to_string()).collect()
}

/// Inputs of the vertical remap taken from the single-level file
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerticalConfig {
    /// Name of the surface pressure variable
    #[serde(default = "default_surface_pressure")]
    pub surface_pressure: String,

    /// Surface field closing the columns of a pressure-level variable, by variable name
    #[serde(default = "default_surface_variables")]
    pub surface_variables: BTreeMap<String, String>,
}

impl Default for VerticalConfig {
    fn default() -> Self {
        Self {
            surface_pressure: default_surface_pressure(),
            surface_variables: default_surface_variables(),
        }
    }
}

fn default_surface_pressure() -> String {
    "sp".to_string()
}

fn default_surface_variables() -> BTreeMap<String, String> {
    BTreeMap::from([("t".to_string(), "t2m".to_string())])
}

/// Climate Data Store endpoint and credentials.
///
/// Unset values fall back to `CDSAPI_URL`/`CDSAPI_KEY` and then to `~/.cdsapirc`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CdsConfig {
    pub url: Option<String>,
    pub key: Option<String>,

    /// First delay between job status requests, doubled up to `max_poll_seconds`
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: u64,

    #[serde(default = "default_max_poll_seconds")]
    pub max_poll_seconds: u64,

    /// Give up on a job after this long
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for CdsConfig {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            poll_seconds: default_poll_seconds(),
            max_poll_seconds: default_max_poll_seconds(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_poll_seconds() -> u64 {
    2
}
fn default_max_poll_seconds() -> u64 {
    120
}
fn default_timeout_seconds() -> u64 {
    24 * 3600
}

impl Config {
    /// Load from `path`, or defaults when no path is given
    ///
    /// # Errors
    ///
    /// Returns [`Era5RadError::ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|e| {
            Era5RadError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// # Errors
    ///
    /// Returns [`Era5RadError::ConfigError`] on malformed TOML or unknown keys.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn allows_negative(&self, variable: &str) -> bool {
        self.negatives.skip.iter().any(|s| s == variable)
    }

    /// Configured range for `variable`, else non-negative unless it may be negative
    pub fn valid_range(&self, variable: &str) -> ValidRange {
        if let Some(range) = self.ranges.get(variable) {
            return *range;
        }
        if self.allows_negative(variable) {
            ValidRange::unbounded()
        } else {
            ValidRange::non_negative()
        }
    }
}
