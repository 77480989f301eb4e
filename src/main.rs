//! Entry point for the era5_rad application.
//! Handles CLI parsing, configuration and logging, and dispatches the subcommands.

use clap::Parser;
use era5_rad::config::{Config, VerticalConfig};
use era5_rad::download::{build_requests, write_request, CdsClient, CdsCredentials, Period};
use era5_rad::guard::{check_consistency, resolve, ConsistencyResult};
use era5_rad::metadata::{compute_variable_summary, describe_packing, print_metadata};
use era5_rad::netcdf_io::{
    attribute_string, find_pressure_axis, load_record_coordinate, load_source, load_source_metadata,
    read_physical, read_variable, remap_dataset, remove_negatives, NetCDFWriter,
};
use era5_rad::orography::{check_orography_masking, OrographyMaskWarning};
use era5_rad::parallel::{get_parallel_info, ParallelConfig};
use era5_rad::plausibility::{detect_non_physical, NonPhysicalValueWarning};
use era5_rad::tools::{combine, horizontal_remap};
use era5_rad::units::UnitsConverter;
use era5_rad::vertical::SigmaGrid;
use era5_rad::Era5RadError;
use netcdf::open;
use std::path::{Path, PathBuf};
use tracing::warn;

mod cli;
mod logging;

use cli::{Args, Command};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let args = Args::parse();
    logging::init(args.verbose);

    println!(
        r#"
------------------------------------------------------------------
            _____ ____      _    ____    ____      _    ____
           | ____|  _ \    / \  | ___|  |  _ \    / \  |  _ \
           |  _| | |_) |  / _ \ |___ \  | |_) |  / _ \ | | | |
           | |___|  _ <  / ___ \ ___) | |  _ <  / ___ \| |_| |
           |_____|_| \_\/_/   \_\____/  |_| \_\/_/   \_\____/
                  ERA5 post-processing for radiation
------------------------------------------------------------------
                        "#
    );

    let config = Config::load(args.config.as_deref())?;

    // Setup parallel processing
    let parallel_config = ParallelConfig::new(args.threads);
    parallel_config.setup_global_pool()?;
    if args.verbose > 0 {
        get_parallel_info().print_info();
    }

    match args.command {
        Command::Inspect { file, summary } => {
            let nc = open(&file)?;
            println!("Successfully opened NetCDF file: {}", file.display());
            print_metadata(&nc)?;
            describe_packing(&nc)?;
            if let Some(var) = summary {
                compute_variable_summary(&nc, &var)?;
            }
        }

        Command::Check {
            datasets,
            variables,
            strict,
        } => run_check(&datasets, &variables, strict)?,

        Command::Resolve {
            datasets,
            variable,
            output,
            policy,
        } => {
            let policy = policy.unwrap_or(config.guard.policy);
            let sources = datasets
                .iter()
                .map(|path| load_source(path, std::slice::from_ref(&variable)))
                .collect::<era5_rad::Result<Vec<_>>>()?;

            let unified = resolve(&sources, &variable, policy)?;

            let range = config.valid_range(&variable);
            if let Some(warning) = NonPhysicalValueWarning::from_scan(&variable, &unified.values, range) {
                warn!("{warning}");
            }

            let record = match unified.dimensions.first() {
                Some(dimension) => load_record_coordinate(&datasets, dimension)?,
                None => None,
            };

            let template = open(&datasets[0])?;
            let mut writer = NetCDFWriter::new(&template, &output);
            if let Some(record) = &record {
                writer = writer.with_record_coordinate(record);
            }
            writer.write_unified(&unified)?;
            println!("✅ Saved {} to {}", variable, output.display());
        }

        Command::Combine {
            datasets,
            output,
            policy,
        } => {
            let policy = policy.unwrap_or(config.guard.policy);
            combine(&config.tools, &datasets, &output, policy)?;
            println!("✅ Combined {} datasets into {}", datasets.len(), output.display());
        }

        Command::Scan {
            file,
            variable,
            range,
        } => {
            let nc = open(&file)?;
            let range = range.unwrap_or_else(|| config.valid_range(&variable));
            let values = read_variable(&nc, &variable)?.physical_values();

            println!("\n Scan of {} against {}", variable, range);
            println!("================================");
            match NonPhysicalValueWarning::from_scan(&variable, &values, range) {
                Some(warning) => {
                    println!("   {warning}");
                    let first: Vec<String> = detect_non_physical(&values, range)
                        .take(10)
                        .map(|i| format!("{}={}", i, values[i]))
                        .collect();
                    println!("   First offending indices: {}", first.join(", "));
                }
                None => println!("   All {} values within range", values.len()),
            }
        }

        Command::RemoveNegatives { dataset } => {
            let replaced = remove_negatives(&dataset, &config)?;
            if replaced.is_empty() {
                println!("No negative values found in {}", dataset.display());
            }
            for r in &replaced {
                println!("   {}: {} values replaced", r.variable, r.replaced);
            }
        }

        Command::Mask {
            level_file,
            single_file,
            variable,
            surface_pressure,
            show,
        } => run_mask(&level_file, &single_file, &variable, &surface_pressure, show)?,

        Command::VerticalRemap {
            level_file,
            single_file,
            output,
            surface_variables,
            surface_pressure,
        } => {
            let mut vertical = config.vertical;
            if !surface_variables.is_empty() {
                vertical.surface_variables = surface_variables.into_iter().collect();
            }
            if let Some(name) = surface_pressure {
                vertical.surface_pressure = name;
            }
            run_vertical_remap(&level_file, &single_file, &output, &vertical)?;
        }

        Command::HorizontalRemap {
            dataset,
            output,
            nlon,
            nlat,
        } => {
            horizontal_remap(&config.tools, &dataset, &output, nlon, nlat)?;
            println!("✅ Remapped {} to {}x{}", dataset.display(), nlon, nlat);
        }

        Command::Download {
            level_file,
            single_file,
            timescale,
            years,
            months,
            days,
            hours,
            dry_run,
        } => {
            let period = Period {
                years,
                months,
                days,
                hours,
            };
            let requests = build_requests(timescale, &period, &level_file, &single_file)?;
            if dry_run {
                for request in &requests {
                    let path = write_request(request)?;
                    println!("   {} -> {}", request.dataset, path.display());
                }
            } else {
                let client = CdsClient::new(CdsCredentials::resolve(&config.cds)?, &config.cds)?;
                for request in &requests {
                    let bytes = client.retrieve(request)?;
                    println!("✅ {} -> {} ({} bytes)", request.dataset, request.target, bytes);
                }
            }
        }
    }

    Ok(())
}

fn run_check(datasets: &[PathBuf], variables: &[String], strict: bool) -> era5_rad::Result<()> {
    let sources = datasets
        .iter()
        .map(|p| load_source_metadata(p))
        .collect::<era5_rad::Result<Vec<_>>>()?;
    let names = if variables.is_empty() {
        sources[0].packed_variable_names()
    } else {
        variables.to_vec()
    };

    println!("\n Packing Consistency");
    println!("====================");
    let mut first_mismatch = None;
    for name in names {
        match check_consistency(&sources, &name)? {
            ConsistencyResult::Consistent => println!("   ✅ {name}"),
            ConsistencyResult::Inconsistent(divergent) => {
                println!("   ❌ {name}");
                for d in &divergent {
                    println!(
                        "      └─ {}: scale_factor {}, add_offset {}",
                        sources[d.source_index].label, d.scale, d.offset
                    );
                }
                first_mismatch.get_or_insert((name, divergent));
            }
        }
    }

    match first_mismatch {
        Some((variable, divergent)) if strict => Err(Era5RadError::PackingMismatch {
            variable,
            divergent,
        }),
        _ => Ok(()),
    }
}

fn run_mask(
    level_file: &Path,
    single_file: &Path,
    variable: &str,
    surface_pressure: &str,
    show: usize,
) -> era5_rad::Result<()> {
    let converter = UnitsConverter::default();
    let levels_nc = open(level_file)?;
    let single_nc = open(single_file)?;

    let axis = find_pressure_axis(&levels_nc, variable, &converter)?;
    let sp_units = variable_units(&single_nc, surface_pressure);
    let factor = converter.convert(&sp_units, &axis.units)?;

    let sp = read_physical(&single_nc, surface_pressure)?.mapv(|v| v * factor);
    let total = sp.len();
    let masked: Vec<_> = check_orography_masking(&axis.levels, sp.view()).collect();

    println!("\n Orography Masking ({} on {})", variable, axis.dimension);
    println!("================================");
    match OrographyMaskWarning::from_masked(masked.iter().copied(), total) {
        Some(warning) => {
            warn!(variable, surface_pressure, "{warning}");
            println!("   {warning}");
            for m in masked.iter().take(show) {
                println!(
                    "      └─ grid point {} level {} ({} {})",
                    m.grid_point, m.level_index, axis.levels[m.level_index], axis.units
                );
            }
        }
        None => println!("   No pressure level lies below the surface"),
    }
    Ok(())
}

fn run_vertical_remap(
    level_file: &Path,
    single_file: &Path,
    output: &Path,
    vertical: &VerticalConfig,
) -> era5_rad::Result<()> {
    let levels_nc = open(level_file)?;
    let single_nc = open(single_file)?;

    let remap = remap_dataset(
        &levels_nc,
        &single_nc,
        vertical,
        &SigmaGrid::era_interim(),
        &UnitsConverter::default(),
    )?;
    if remap.remapped.is_empty() {
        warn!(file = %level_file.display(), "no variable on pressure levels found");
    }

    NetCDFWriter::new(&levels_nc, output).write_vertical_remap(&remap)?;
    for remapped in &remap.remapped {
        println!(
            "   {} remapped to {} sigma levels",
            remapped.name,
            remapped.result.values.shape()[remapped.level_axis]
        );
    }
    println!("✅ Saved remapped dataset to {}", output.display());
    Ok(())
}

/// Units of a variable, assuming Pa for an unannotated surface pressure
fn variable_units(file: &netcdf::File, name: &str) -> String {
    file.variable(name)
        .and_then(|v| attribute_string(&v, "units"))
        .unwrap_or_else(|| "Pa".to_string())
}
