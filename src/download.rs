//! Copernicus Climate Data Store (CDS) retrieval of ERA5 data
//!
//! Builds the dataset name and request parameters for the pressure-level and
//! single-level products, then runs them against the CDS retrieve API: the
//! request is submitted as a job, the job is polled until it finishes, and the
//! resulting file is streamed to the target path. Credentials come from the
//! configuration, `CDSAPI_URL`/`CDSAPI_KEY`, or `~/.cdsapirc`.

use crate::config::CdsConfig;
use crate::errors::{Era5RadError, Result};
use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};
use std::env;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Retrieve API used when no URL is configured
pub const DEFAULT_CDS_URL: &str = "https://cds.climate.copernicus.eu/api";

/// Pressure levels (hPa) requested for the level product
pub const PRESSURE_LEVELS: [u32; 37] = [
    1, 2, 3, 5, 7, 10, 20, 30, 50, 70, 100, 125, 150, 175, 200, 225, 250, 300, 350, 400, 450, 500,
    550, 600, 650, 700, 750, 775, 800, 825, 850, 875, 900, 925, 950, 975, 1000,
];

/// Variables requested on pressure levels
pub const LEVEL_VARIABLES: [&str; 6] = [
    "ozone_mass_mixing_ratio",
    "specific_humidity",
    "temperature",
    "fraction_of_cloud_cover",
    "specific_cloud_ice_water_content",
    "specific_cloud_liquid_water_content",
];

/// Surface and top-of-atmosphere variables requested on single levels
pub const SINGLE_VARIABLES: [&str; 22] = [
    "near_ir_albedo_for_diffuse_radiation",
    "near_ir_albedo_for_direct_radiation",
    "skin_temperature",
    "surface_pressure",
    "toa_incident_solar_radiation",
    "uv_visible_albedo_for_diffuse_radiation",
    "uv_visible_albedo_for_direct_radiation",
    "2m_temperature",
    "mean_surface_downward_long_wave_radiation_flux_clear_sky",
    "mean_surface_downward_short_wave_radiation_flux_clear_sky",
    "mean_surface_net_long_wave_radiation_flux_clear_sky",
    "mean_surface_net_short_wave_radiation_flux_clear_sky",
    "mean_top_downward_short_wave_radiation_flux",
    "mean_top_net_long_wave_radiation_flux_clear_sky",
    "mean_top_net_short_wave_radiation_flux_clear_sky",
    "mean_surface_downward_long_wave_radiation_flux",
    "mean_surface_downward_short_wave_radiation_flux",
    "mean_surface_downward_uv_radiation_flux",
    "mean_surface_net_long_wave_radiation_flux",
    "mean_surface_net_short_wave_radiation_flux",
    "mean_top_net_long_wave_radiation_flux",
    "mean_top_net_short_wave_radiation_flux",
];

/// Temporal resolution of the ERA5 product
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Timescale {
    Hourly,
    Monthly,
}

impl Timescale {
    pub const fn product_type(self) -> &'static str {
        match self {
            Self::Hourly => "reanalysis",
            Self::Monthly => "monthly_averaged_reanalysis",
        }
    }

    pub const fn level_dataset(self) -> &'static str {
        match self {
            Self::Hourly => "reanalysis-era5-pressure-levels",
            Self::Monthly => "reanalysis-era5-pressure-levels-monthly-means",
        }
    }

    pub const fn single_dataset(self) -> &'static str {
        match self {
            Self::Hourly => "reanalysis-era5-single-levels",
            Self::Monthly => "reanalysis-era5-single-levels-monthly-means",
        }
    }
}

/// Inclusive ranges selecting the period to retrieve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Period {
    pub years: (u32, u32),
    pub months: (u32, u32),
    pub days: Option<(u32, u32)>,
    pub hours: Option<(u32, u32)>,
}

impl Period {
    fn validate(&self) -> Result<()> {
        let check = |name: &str, (start, end): (u32, u32), min: u32, max: u32| {
            if start > end || start < min || end > max {
                Err(Era5RadError::InvalidInput {
                    message: format!("invalid {name} range {start}..={end}"),
                })
            } else {
                Ok(())
            }
        };
        check("year", self.years, 1940, 9999)?;
        check("month", self.months, 1, 12)?;
        if let Some(days) = self.days {
            check("day", days, 1, 31)?;
        }
        if let Some(hours) = self.hours {
            check("hour", hours, 0, 23)?;
        }
        Ok(())
    }
}

/// One CDS API retrieval: dataset name, request parameters and target file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalRequest {
    pub dataset: String,
    pub request: JsonValue,
    pub target: String,
}

fn padded(range: (u32, u32), width: usize) -> Vec<String> {
    (range.0..=range.1)
        .map(|v| format!("{v:0width$}"))
        .collect()
}

fn build_request(
    dataset: &str,
    timescale: Timescale,
    variables: &[&str],
    period: &Period,
    pressure_levels: Option<&[u32]>,
    target: &Path,
) -> RetrievalRequest {
    let mut params = Map::new();
    params.insert("format".into(), json!("netcdf"));
    params.insert("product_type".into(), json!(timescale.product_type()));
    params.insert("variable".into(), json!(variables));
    params.insert("year".into(), json!(padded(period.years, 4)));
    params.insert("month".into(), json!(padded(period.months, 2)));
    if let Some(days) = period.days {
        params.insert("day".into(), json!(padded(days, 2)));
    }
    match period.hours {
        Some(hours) => {
            let times: Vec<String> = padded(hours, 2).into_iter().map(|h| format!("{h}:00")).collect();
            params.insert("time".into(), json!(times));
        }
        None => {
            params.insert("time".into(), json!("00:00"));
        }
    }
    if let Some(levels) = pressure_levels {
        let levels: Vec<String> = levels.iter().map(u32::to_string).collect();
        params.insert("pressure_level".into(), json!(levels));
    }

    RetrievalRequest {
        dataset: dataset.to_string(),
        request: JsonValue::Object(params),
        target: target.display().to_string(),
    }
}

/// Requests for the pressure-level and single-level products, in that order
///
/// # Errors
///
/// Returns [`Era5RadError::InvalidInput`] for empty or out-of-range periods.
pub fn build_requests(
    timescale: Timescale,
    period: &Period,
    level_target: &Path,
    single_target: &Path,
) -> Result<[RetrievalRequest; 2]> {
    period.validate()?;
    Ok([
        build_request(
            timescale.level_dataset(),
            timescale,
            &LEVEL_VARIABLES,
            period,
            Some(&PRESSURE_LEVELS[..]),
            level_target,
        ),
        build_request(
            timescale.single_dataset(),
            timescale,
            &SINGLE_VARIABLES,
            period,
            None,
            single_target,
        ),
    ])
}

/// Write a request next to its target as `<target>.request.json`
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_request(request: &RetrievalRequest) -> Result<PathBuf> {
    let path = PathBuf::from(format!("{}.request.json", request.target));
    let text = serde_json::to_string_pretty(request)?;
    std::fs::write(&path, text)?;
    info!(dataset = %request.dataset, path = %path.display(), "wrote CDS request");
    Ok(path)
}

/// `url:` and `key:` entries of a `.cdsapirc` file
pub fn parse_cdsapirc(text: &str) -> (Option<String>, Option<String>) {
    let mut url = None;
    let mut key = None;
    for line in text.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match name.trim() {
            "url" => url = Some(value.to_string()),
            "key" => key = Some(value.to_string()),
            _ => {}
        }
    }
    (url, key)
}

/// Endpoint and personal access token of the retrieve API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdsCredentials {
    pub url: String,
    pub key: String,
}

impl CdsCredentials {
    /// Combine the configured values, then the environment, then `.cdsapirc` contents
    ///
    /// # Errors
    ///
    /// Returns [`Era5RadError::ConfigError`] when no key is found.
    pub fn merge(
        config: &CdsConfig,
        env_url: Option<String>,
        env_key: Option<String>,
        rc: Option<&str>,
    ) -> Result<Self> {
        let (rc_url, rc_key) = rc.map(parse_cdsapirc).unwrap_or_default();
        let url = config
            .url
            .clone()
            .or(env_url)
            .or(rc_url)
            .unwrap_or_else(|| DEFAULT_CDS_URL.to_string());
        let key = config
            .key
            .clone()
            .or(env_key)
            .or(rc_key)
            .ok_or_else(|| {
                Era5RadError::ConfigError(
                    "no CDS API key: set [cds] key, CDSAPI_KEY or ~/.cdsapirc".to_string(),
                )
            })?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            key,
        })
    }

    /// Credentials from the configuration, the environment and the `.cdsapirc` file
    ///
    /// # Errors
    ///
    /// Returns an error if the rc file exists but cannot be read, or no key is found.
    pub fn resolve(config: &CdsConfig) -> Result<Self> {
        let rc_path = env::var_os("CDSAPI_RC")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".cdsapirc")));
        let rc = match rc_path {
            Some(path) if path.is_file() => Some(std::fs::read_to_string(&path)?),
            _ => None,
        };
        Self::merge(
            config,
            env::var("CDSAPI_URL").ok(),
            env::var("CDSAPI_KEY").ok(),
            rc.as_deref(),
        )
    }
}

/// State of a retrieval job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Accepted,
    Running,
    Successful,
    Failed,
}

impl JobStatus {
    /// Status field of a job document
    ///
    /// # Errors
    ///
    /// Returns [`Era5RadError::RetrievalFailed`] for a missing or unknown status.
    pub fn from_document(dataset: &str, document: &JsonValue) -> Result<Self> {
        match document.get("status").and_then(JsonValue::as_str) {
            Some("accepted") => Ok(Self::Accepted),
            Some("running") => Ok(Self::Running),
            Some("successful") => Ok(Self::Successful),
            Some("failed" | "rejected" | "dismissed" | "deleted") => Ok(Self::Failed),
            other => Err(Era5RadError::RetrievalFailed {
                dataset: dataset.to_string(),
                message: format!("unexpected job status {other:?}"),
            }),
        }
    }
}

/// Download link of a finished job's results document
///
/// # Errors
///
/// Returns [`Era5RadError::RetrievalFailed`] when the document has no link.
pub fn result_href(dataset: &str, results: &JsonValue) -> Result<String> {
    results
        .pointer("/asset/value/href")
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| Era5RadError::RetrievalFailed {
            dataset: dataset.to_string(),
            message: "results carry no download link".to_string(),
        })
}

fn failure_message(job_id: &str, document: &JsonValue) -> String {
    ["detail", "message", "title"]
        .iter()
        .find_map(|field| document.get(field).and_then(JsonValue::as_str))
        .map_or_else(|| format!("job {job_id} failed"), |m| format!("job {job_id}: {m}"))
}

/// Blocking client of the CDS retrieve API
pub struct CdsClient {
    http: reqwest::blocking::Client,
    credentials: CdsCredentials,
    poll: Duration,
    max_poll: Duration,
    timeout: Duration,
}

impl CdsClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(credentials: CdsCredentials, config: &CdsConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(concat!("era5_rad/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            credentials,
            poll: Duration::from_secs(config.poll_seconds.max(1)),
            max_poll: Duration::from_secs(config.max_poll_seconds.max(config.poll_seconds).max(1)),
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }

    pub fn execution_url(&self, dataset: &str) -> String {
        format!(
            "{}/retrieve/v1/processes/{}/execution",
            self.credentials.url, dataset
        )
    }

    pub fn job_url(&self, job_id: &str) -> String {
        format!("{}/retrieve/v1/jobs/{}", self.credentials.url, job_id)
    }

    fn get_json(&self, url: &str) -> Result<JsonValue> {
        Ok(self
            .http
            .get(url)
            .header("PRIVATE-TOKEN", self.credentials.key.as_str())
            .send()?
            .error_for_status()?
            .json()?)
    }

    /// Submit `request`, wait for the job and write its result to the target file.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`Era5RadError::RetrievalFailed`] if the job fails or times out, and
    /// HTTP or I/O errors otherwise.
    pub fn retrieve(&self, request: &RetrievalRequest) -> Result<u64> {
        let dataset = request.dataset.as_str();
        let submitted: JsonValue = self
            .http
            .post(self.execution_url(dataset))
            .header("PRIVATE-TOKEN", self.credentials.key.as_str())
            .json(&json!({ "inputs": request.request }))
            .send()?
            .error_for_status()?
            .json()?;
        let job_id = submitted
            .get("jobID")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| Era5RadError::RetrievalFailed {
                dataset: dataset.to_string(),
                message: "submission returned no job id".to_string(),
            })?
            .to_string();
        info!(dataset, job = %job_id, "submitted CDS request");

        let started = Instant::now();
        let mut delay = self.poll;
        loop {
            let document = self.get_json(&self.job_url(&job_id))?;
            match JobStatus::from_document(dataset, &document)? {
                JobStatus::Successful => break,
                JobStatus::Failed => {
                    return Err(Era5RadError::RetrievalFailed {
                        dataset: dataset.to_string(),
                        message: failure_message(&job_id, &document),
                    })
                }
                status => {
                    if started.elapsed() > self.timeout {
                        return Err(Era5RadError::RetrievalFailed {
                            dataset: dataset.to_string(),
                            message: format!(
                                "job {job_id} still {status:?} after {}s",
                                self.timeout.as_secs()
                            ),
                        });
                    }
                    debug!(job = %job_id, ?status, delay_secs = delay.as_secs(), "waiting for CDS job");
                    thread::sleep(delay);
                    delay = (delay * 2).min(self.max_poll);
                }
            }
        }

        let results = self.get_json(&format!("{}/results", self.job_url(&job_id)))?;
        let href = result_href(dataset, &results)?;
        let mut response = self.http.get(&href).send()?.error_for_status()?;
        let mut file = std::fs::File::create(&request.target)?;
        let bytes = response.copy_to(&mut file)?;
        info!(dataset, target = %request.target, bytes, "retrieved CDS result");
        Ok(bytes)
    }
}
