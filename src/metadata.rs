//! NetCDF metadata inspection with attention to packing
//!
//! This module lists the structure of a file and reports, for every packed
//! variable, the parameters that decide whether it may be concatenated as is.

use crate::errors::Result;
use crate::netcdf_io::{attribute_string, read_fill_value, read_packing, read_variable, RawType};
use netcdf::File;

/// Packing summary of one variable
#[derive(Debug, Clone, PartialEq)]
pub struct PackedVariableInfo {
    pub name: String,
    pub data_type: RawType,
    pub dimensions: Vec<String>,
    pub scale: f64,
    pub offset: f64,
    pub fill_value: Option<f64>,
    pub units: Option<String>,
}

/// Quick statistics over the physical values of a variable
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSummary {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub valid: usize,
    pub missing: usize,
}

/// Prints global attributes and variables of a NetCDF file.
pub fn print_metadata(file: &File) -> Result<()> {
    println!("\n===== Global Attributes =====");
    for attr in file.attributes() {
        println!("- {}: {:?}", attr.name(), attr.value()?);
    }

    println!("\n===== Variables =====");
    for var in file.variables() {
        let dims: Vec<String> = var
            .dimensions()
            .iter()
            .map(|d| format!("{}[{}]", d.name(), d.len()))
            .collect();
        println!("- {} ({})", var.name(), dims.join(", "));
    }

    Ok(())
}

/// Collects and prints the packing parameters of every packed variable.
pub fn describe_packing(file: &File) -> Result<Vec<PackedVariableInfo>> {
    let mut variables: Vec<_> = file.variables().collect();
    variables.sort_by_key(|v| v.name());

    let mut packed = Vec::new();
    for var in variables {
        let Some(packing) = read_packing(&var) else {
            continue;
        };
        packed.push(PackedVariableInfo {
            name: var.name(),
            data_type: RawType::of(&var)?,
            dimensions: var.dimensions().iter().map(|d| d.name()).collect(),
            scale: packing.scale,
            offset: packing.offset,
            fill_value: read_fill_value(&var),
            units: attribute_string(&var, "units"),
        });
    }

    println!("\n Packed Variables");
    println!("==================");
    if packed.is_empty() {
        println!("   (No packed variables found)");
    }
    for info in &packed {
        println!(
            "    {} ({:?}) [{}]",
            info.name,
            info.data_type,
            info.dimensions.join(", ")
        );
        let mut details = vec![
            format!("scale_factor: {}", info.scale),
            format!("add_offset: {}", info.offset),
        ];
        if let Some(fill) = info.fill_value {
            details.push(format!("_FillValue: {fill}"));
        }
        if let Some(units) = &info.units {
            details.push(format!("units: {units}"));
        }
        println!("      └─ {}", details.join(", "));
    }

    Ok(packed)
}

/// Computes quick statistics (min/mean/max/std) on the unpacked values of a variable.
pub fn compute_variable_summary(file: &File, var_name: &str) -> Result<VariableSummary> {
    let variable = read_variable(file, var_name)?;
    let physical = variable.physical_values();
    let data: Vec<f64> = physical.iter().copied().filter(|x| x.is_finite()).collect();

    #[allow(clippy::cast_precision_loss)]
    let n = data.len() as f64;
    let min = data.iter().copied().fold(f64::INFINITY, f64::min);
    let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = data.iter().sum::<f64>() / n;
    let std_dev = (data.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();

    let summary = VariableSummary {
        name: var_name.to_string(),
        min,
        max,
        mean,
        std_dev,
        valid: data.len(),
        missing: physical.len() - data.len(),
    };

    println!("\n Summary for Variable: {}", var_name);
    println!("================================");
    println!("   Min: {}", summary.min);
    println!("   Max: {}", summary.max);
    println!("   Mean: {:.4}", summary.mean);
    println!("   Std Dev: {:.4}", summary.std_dev);
    println!("   Valid / missing: {} / {}", summary.valid, summary.missing);

    Ok(summary)
}
