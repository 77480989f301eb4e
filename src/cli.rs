//! Defines command-line interface options using `clap` for the era5_rad application.

use clap::{Parser, Subcommand};
use era5_rad::download::Timescale;
use era5_rad::guard::ResolvePolicy;
use era5_rad::plausibility::ValidRange;
use std::path::PathBuf;

/// ERA5 reanalysis post-processing for clear-sky radiation
#[derive(Parser, Debug)]
#[command(
    version,
    name = "era5_rad",
    about = "ERA5 reanalysis radiation tool"
)]
pub struct Args {
    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Number of threads to use for parallel processing. Defaults to number of CPU cores.
    #[arg(short = 't', long, global = true)]
    pub threads: Option<usize>,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List variables and the packing parameters of a NetCDF file
    Inspect {
        /// Path to the NetCDF file
        file: PathBuf,

        /// Compute quick statistics (min/mean/max/std) of the unpacked variable
        #[arg(long)]
        summary: Option<String>,
    },

    /// Compare packing parameters across datasets without modifying anything
    Check {
        /// Input datasets, in concatenation order
        #[arg(required = true)]
        datasets: Vec<PathBuf>,

        /// Variables to check. Defaults to every packed variable of the first dataset.
        #[arg(long = "var")]
        variables: Vec<String>,

        /// Exit with an error when any variable is inconsistent
        #[arg(long, default_value_t = false)]
        strict: bool,
    },

    /// Unpack one variable from several datasets and concatenate it in-process
    Resolve {
        /// Input datasets, in concatenation order
        #[arg(required = true)]
        datasets: Vec<PathBuf>,

        /// Variable to combine
        #[arg(long = "var")]
        variable: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Behaviour on packing mismatch. Defaults to the configured policy.
        #[arg(long, value_enum)]
        policy: Option<ResolvePolicy>,
    },

    /// Concatenate datasets with ncrcat, unpacking with ncpdq first when required
    Combine {
        /// Input datasets
        #[arg(required = true)]
        datasets: Vec<PathBuf>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Behaviour on packing mismatch. Defaults to the configured policy.
        #[arg(long, value_enum)]
        policy: Option<ResolvePolicy>,
    },

    /// Report values of a variable outside its valid range
    Scan {
        /// Path to the NetCDF file
        file: PathBuf,

        /// Variable to scan
        #[arg(long = "var")]
        variable: String,

        /// Valid range formatted as <min>:<max>; either side may be empty
        #[arg(long, value_parser = parse_range_arg)]
        range: Option<ValidRange>,
    },

    /// Replace negative values with the smallest positive packed value, in place
    RemoveNegatives {
        /// Dataset to be modified
        dataset: PathBuf,
    },

    /// Report pressure levels lying below the surface
    Mask {
        /// File with data on pressure levels
        level_file: PathBuf,

        /// File with surface pressure
        single_file: PathBuf,

        /// Variable on pressure levels whose pressure axis is used
        #[arg(long = "var", default_value = "t")]
        variable: String,

        /// Name of the surface pressure variable
        #[arg(long, default_value = "sp")]
        surface_pressure: String,

        /// Number of masked pairs to print
        #[arg(long, default_value_t = 10)]
        show: usize,
    },

    /// Remap every pressure-level variable to the ERA-Interim sigma grid
    VerticalRemap {
        /// File with data on pressure levels
        level_file: PathBuf,

        /// File with surface pressure and surface values
        single_file: PathBuf,

        /// Output file path
        output: PathBuf,

        /// Surface field closing the columns of a variable, as <var>=<surface var>.
        /// Replaces the configured mapping (t=t2m by default).
        #[arg(long = "surface-var", value_parser = parse_pair_arg)]
        surface_variables: Vec<(String, String)>,

        /// Name of the surface pressure variable. Defaults to the configured one (sp).
        #[arg(long)]
        surface_pressure: Option<String>,
    },

    /// Conservative horizontal remap with cdo
    HorizontalRemap {
        /// Dataset to be remapped
        dataset: PathBuf,

        /// Output file path
        output: PathBuf,

        /// Number of longitude points
        nlon: usize,

        /// Number of latitude points
        nlat: usize,
    },

    /// Retrieve ERA5 pressure-level and single-level data from the Climate Data Store
    Download {
        /// Output file path for pressure level data
        level_file: PathBuf,

        /// Output file path for single level data
        single_file: PathBuf,

        #[arg(value_enum)]
        timescale: Timescale,

        /// Years, formatted as <first>:<last>
        #[arg(long, value_parser = parse_span_arg)]
        years: (u32, u32),

        /// Months, formatted as <first>:<last>
        #[arg(long, value_parser = parse_span_arg)]
        months: (u32, u32),

        /// Days, formatted as <first>:<last>
        #[arg(long, value_parser = parse_span_arg)]
        days: Option<(u32, u32)>,

        /// Hours, formatted as <first>:<last>. Defaults to 00:00 only.
        #[arg(long, value_parser = parse_span_arg)]
        hours: Option<(u32, u32)>,

        /// Only write the requests as <target>.request.json, without retrieving
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

fn parse_range_arg(s: &str) -> Result<ValidRange, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let bound = |text: &str| -> Result<Option<f64>, String> {
        if text.trim().is_empty() {
            Ok(None)
        } else {
            text.trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| format!("Invalid bound '{text}'"))
        }
    };
    match parts.as_slice() {
        [min, max] => Ok(ValidRange::new(bound(min)?, bound(max)?)),
        _ => Err("Invalid format: Expected '<min>:<max>'.".to_string()),
    }
}

fn parse_span_arg(s: &str) -> Result<(u32, u32), String> {
    let parts: Vec<&str> = s.split(':').collect();
    let number = |text: &str| {
        text.parse::<u32>()
            .map_err(|_| format!("Invalid number '{text}'"))
    };
    match parts.as_slice() {
        [single] => {
            let v = number(single)?;
            Ok((v, v))
        }
        [first, last] => Ok((number(first)?, number(last)?)),
        _ => Err("Invalid format: Expected '<first>:<last>'.".to_string()),
    }
}

fn parse_pair_arg(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((variable, surface)) if !variable.trim().is_empty() && !surface.trim().is_empty() => {
            Ok((variable.trim().to_string(), surface.trim().to_string()))
        }
        _ => Err("Invalid format: Expected '<var>=<surface var>'.".to_string()),
    }
}
