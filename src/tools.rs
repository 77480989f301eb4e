//! Wrappers around the external NetCDF operators
//!
//! `ncrcat`, `ncpdq` (NCO) and `cdo` are run as subprocesses. This module only
//! builds their command lines, checks that they are installed, and decides when
//! inputs must be unpacked before concatenation.

use crate::config::ToolsConfig;
use crate::errors::{Era5RadError, Result};
use crate::guard::{check_consistency, ConsistencyResult, Divergence, ResolvePolicy};
use crate::netcdf_io::load_source_metadata;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// A command line for an external tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<OsString>,
}

impl ToolInvocation {
    fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
        }
    }

    fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Run to completion, failing on a non-zero exit status
    ///
    /// # Errors
    ///
    /// Returns [`Era5RadError::ToolNotFound`] if the program cannot be started and
    /// [`Era5RadError::ToolFailed`] if it exits unsuccessfully.
    pub fn run(&self) -> Result<()> {
        debug!(program = %self.program, args = ?self.args, "running external tool");
        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Era5RadError::ToolNotFound {
                    tool: self.program.clone(),
                },
                _ => Era5RadError::IoError(e),
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(Era5RadError::ToolFailed {
                tool: self.program.clone(),
                status: status.to_string(),
            })
        }
    }
}

/// Locate `program` on `PATH`, or check it directly when it contains a separator
///
/// # Errors
///
/// Returns [`Era5RadError::ToolNotFound`] when no executable file is found.
pub fn locate(program: &str) -> Result<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return if candidate.is_file() {
            Ok(candidate.to_path_buf())
        } else {
            Err(Era5RadError::ToolNotFound {
                tool: program.to_string(),
            })
        };
    }
    env::var_os("PATH")
        .iter()
        .flat_map(env::split_paths)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
        .ok_or_else(|| Era5RadError::ToolNotFound {
            tool: program.to_string(),
        })
}

/// `ncpdq --unpack input output`
pub fn unpack_invocation(tools: &ToolsConfig, input: &Path, output: &Path) -> ToolInvocation {
    ToolInvocation::new(&tools.ncpdq)
        .arg("--unpack")
        .arg(input)
        .arg(output)
}

/// `ncrcat inputs... output`
pub fn concatenate_invocation(
    tools: &ToolsConfig,
    inputs: &[PathBuf],
    output: &Path,
) -> ToolInvocation {
    inputs
        .iter()
        .fold(ToolInvocation::new(&tools.ncrcat), |inv, input| inv.arg(input))
        .arg(output)
}

/// `cdo gencon,r<nlon>x<nlat> input weights`
pub fn remap_weights_invocation(
    tools: &ToolsConfig,
    input: &Path,
    weights: &Path,
    nlon: usize,
    nlat: usize,
) -> ToolInvocation {
    ToolInvocation::new(&tools.cdo)
        .arg(format!("gencon,r{nlon}x{nlat}"))
        .arg(input)
        .arg(weights)
}

/// `cdo -f nc4 remap,r<nlon>x<nlat>,weights input output`
pub fn remap_invocation(
    tools: &ToolsConfig,
    input: &Path,
    weights: &Path,
    output: &Path,
    nlon: usize,
    nlat: usize,
) -> ToolInvocation {
    ToolInvocation::new(&tools.cdo)
        .arg("-f")
        .arg("nc4")
        .arg(format!("remap,r{nlon}x{nlat},{}", weights.display()))
        .arg(input)
        .arg(output)
}

/// Packing disagreement found while planning a concatenation
#[derive(Debug, Clone, PartialEq)]
pub struct PackingReport {
    pub variable: String,
    pub divergent: Vec<Divergence>,
}

/// Check every packed variable of the first input against all inputs
///
/// # Errors
///
/// Returns an error if an input cannot be read or lacks a packed variable of the first.
pub fn packing_reports(inputs: &[PathBuf]) -> Result<Vec<PackingReport>> {
    let sources = inputs
        .iter()
        .map(|p| load_source_metadata(p))
        .collect::<Result<Vec<_>>>()?;
    let Some(first) = sources.first() else {
        return Ok(Vec::new());
    };

    let mut reports = Vec::new();
    for name in first.packed_variable_names() {
        if let ConsistencyResult::Inconsistent(divergent) = check_consistency(&sources, &name)? {
            reports.push(PackingReport {
                variable: name,
                divergent,
            });
        }
    }
    Ok(reports)
}

/// Concatenate datasets along their record dimension with `ncrcat`.
///
/// Inputs are sorted by path first. Under [`ResolvePolicy::UnpackAll`] every input
/// is unpacked with `ncpdq` into a temporary directory before concatenation;
/// under [`ResolvePolicy::FailOnMismatch`] the packed inputs are concatenated as
/// they are, after confirming their packing agrees.
///
/// # Errors
///
/// Returns [`Era5RadError::PackingMismatch`] for the first disagreeing variable
/// under `FailOnMismatch`, or any tool error.
pub fn combine(
    tools: &ToolsConfig,
    inputs: &[PathBuf],
    output: &Path,
    policy: ResolvePolicy,
) -> Result<()> {
    if inputs.is_empty() {
        return Err(Era5RadError::InvalidInput {
            message: "combine needs at least one input dataset".to_string(),
        });
    }
    locate(&tools.ncrcat)?;
    locate(&tools.ncpdq)?;

    let mut sorted = inputs.to_vec();
    sorted.sort();

    let reports = packing_reports(&sorted)?;
    for report in &reports {
        warn!(
            variable = %report.variable,
            sources = report.divergent.len(),
            "packing differs between inputs"
        );
    }

    match policy {
        ResolvePolicy::FailOnMismatch => {
            if let Some(report) = reports.into_iter().next() {
                return Err(Era5RadError::PackingMismatch {
                    variable: report.variable,
                    divergent: report.divergent,
                });
            }
            info!(inputs = sorted.len(), "packing consistent, concatenating packed inputs");
            concatenate_invocation(tools, &sorted, output).run()
        }
        ResolvePolicy::UnpackAll => {
            let staging = tempfile::tempdir()?;
            let mut unpacked = Vec::with_capacity(sorted.len());
            for (index, input) in sorted.iter().enumerate() {
                let name = input
                    .file_name()
                    .map_or_else(|| OsString::from(format!("input-{index}.nc")), |n| n.to_os_string());
                // Prefix keeps staged names unique when inputs share a file name
                let mut staged_name = OsString::from(format!("{index:04}-"));
                staged_name.push(name);
                let staged = staging.path().join(staged_name);
                unpack_invocation(tools, input, &staged).run()?;
                unpacked.push(staged);
            }
            info!(inputs = unpacked.len(), "concatenating unpacked inputs");
            concatenate_invocation(tools, &unpacked, output).run()
        }
    }
}

/// Conservative remap onto a regular `nlon` x `nlat` grid with `cdo`
///
/// # Errors
///
/// Returns an error if `cdo` is missing or fails.
pub fn horizontal_remap(
    tools: &ToolsConfig,
    input: &Path,
    output: &Path,
    nlon: usize,
    nlat: usize,
) -> Result<()> {
    locate(&tools.cdo)?;
    let staging = tempfile::tempdir()?;
    let weights = staging.path().join("remap-weights.nc");
    remap_weights_invocation(tools, input, &weights, nlon, nlat).run()?;
    remap_invocation(tools, input, &weights, output, nlon, nlat).run()
}
