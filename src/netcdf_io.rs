//! NetCDF I/O: reading packed variables and writing unpacked results
//!
//! Stored values are always read in the variable's native type and only then
//! widened, so packed integers are never decoded by the NetCDF library itself.

use crate::config::{Config, VerticalConfig};
use crate::errors::{Era5RadError, Result};
use crate::guard::{resolve, ResolvePolicy, SourceFile, StoredValues, UnifiedVariable, Variable};
use crate::packing::PackingParams;
use crate::plausibility::clamp_negatives;
use crate::units::UnitsConverter;
use crate::vertical::{remap_variable, RemapResult, SigmaGrid};
use chrono::Utc;
use ndarray::{ArrayD, Axis, IxDyn};
use netcdf::{AttributeValue, File, FileMut};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// Attributes describing the stored representation, dropped from unpacked output
const PACKING_ATTRIBUTES: [&str; 6] = [
    "scale_factor",
    "add_offset",
    "_FillValue",
    "missing_value",
    "valid_min",
    "valid_max",
];

/// Native storage type of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl RawType {
    /// Classify a variable from its NetCDF type
    pub fn of(var: &netcdf::Variable) -> Result<Self> {
        let vartype = format!("{:?}", var.vartype()).to_lowercase();
        let kind = if vartype.contains("f64") || vartype.contains("double") {
            Self::F64
        } else if vartype.contains("f32") || vartype.contains("float") {
            Self::F32
        } else if vartype.contains("u8") || vartype.contains("ubyte") || vartype.contains("uchar")
        {
            Self::U8
        } else if vartype.contains("i8") || vartype.contains("byte") || vartype.contains("schar") {
            Self::I8
        } else if vartype.contains("u16") || vartype.contains("ushort") {
            Self::U16
        } else if vartype.contains("i16") || vartype.contains("short") {
            Self::I16
        } else if vartype.contains("u32") || vartype == "uint" {
            Self::U32
        } else if vartype.contains("i32") || vartype == "int" {
            Self::I32
        } else if vartype.contains("u64") || vartype.contains("ulonglong") {
            Self::U64
        } else if vartype.contains("i64") || vartype.contains("longlong") {
            Self::I64
        } else {
            return Err(Era5RadError::InvalidInput {
                message: format!(
                    "variable '{}' has unsupported type {}",
                    var.name(),
                    vartype
                ),
            });
        };
        Ok(kind)
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, Self::F32 | Self::F64)
    }
}

/// Numeric attribute widened to f64
pub fn attribute_f64(var: &netcdf::Variable, name: &str) -> Option<f64> {
    match var.attribute_value(name)?.ok()? {
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Float(v) => Some(f64::from(v)),
        AttributeValue::Short(v) => Some(f64::from(v)),
        AttributeValue::Ushort(v) => Some(f64::from(v)),
        AttributeValue::Int(v) => Some(f64::from(v)),
        AttributeValue::Uint(v) => Some(f64::from(v)),
        AttributeValue::Schar(v) => Some(f64::from(v)),
        AttributeValue::Uchar(v) => Some(f64::from(v)),
        #[allow(clippy::cast_precision_loss)]
        AttributeValue::Longlong(v) => Some(v as f64),
        _ => None,
    }
}

pub fn attribute_string(var: &netcdf::Variable, name: &str) -> Option<String> {
    match var.attribute_value(name)?.ok()? {
        AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

/// Packing parameters, if either `scale_factor` or `add_offset` is present
pub fn read_packing(var: &netcdf::Variable) -> Option<PackingParams> {
    let scale = attribute_f64(var, "scale_factor");
    let offset = attribute_f64(var, "add_offset");
    if scale.is_none() && offset.is_none() {
        return None;
    }
    Some(PackingParams::new(
        scale.unwrap_or(1.0),
        offset.unwrap_or(0.0),
    ))
}

/// Raw `_FillValue`, falling back to `missing_value`
pub fn read_fill_value(var: &netcdf::Variable) -> Option<f64> {
    attribute_f64(var, "_FillValue").or_else(|| attribute_f64(var, "missing_value"))
}

fn read_stored(var: &netcdf::Variable) -> Result<StoredValues> {
    let widen = |v: Vec<i64>| StoredValues::Integer(v);
    let values = match RawType::of(var)? {
        RawType::I8 => widen(var.get_values::<i8, _>(..)?.into_iter().map(i64::from).collect()),
        RawType::U8 => widen(var.get_values::<u8, _>(..)?.into_iter().map(i64::from).collect()),
        RawType::I16 => widen(var.get_values::<i16, _>(..)?.into_iter().map(i64::from).collect()),
        RawType::U16 => widen(var.get_values::<u16, _>(..)?.into_iter().map(i64::from).collect()),
        RawType::I32 => widen(var.get_values::<i32, _>(..)?.into_iter().map(i64::from).collect()),
        RawType::U32 => widen(var.get_values::<u32, _>(..)?.into_iter().map(i64::from).collect()),
        RawType::I64 => widen(var.get_values::<i64, _>(..)?),
        RawType::U64 => widen(
            var.get_values::<u64, _>(..)?
                .into_iter()
                .map(|v| {
                    i64::try_from(v).map_err(|_| Era5RadError::InvalidInput {
                        message: format!("value {} of '{}' does not fit in i64", v, var.name()),
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        ),
        RawType::F32 => StoredValues::Float(
            var.get_values::<f32, _>(..)?
                .into_iter()
                .map(f64::from)
                .collect(),
        ),
        RawType::F64 => StoredValues::Float(var.get_values::<f64, _>(..)?),
    };
    Ok(values)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn write_stored(var: &mut netcdf::VariableMut, kind: RawType, stored: &[f64]) -> Result<()> {
    match kind {
        RawType::I8 => var.put_values(&stored.iter().map(|&v| v as i8).collect::<Vec<_>>(), ..)?,
        RawType::U8 => var.put_values(&stored.iter().map(|&v| v as u8).collect::<Vec<_>>(), ..)?,
        RawType::I16 => var.put_values(&stored.iter().map(|&v| v as i16).collect::<Vec<_>>(), ..)?,
        RawType::U16 => var.put_values(&stored.iter().map(|&v| v as u16).collect::<Vec<_>>(), ..)?,
        RawType::I32 => var.put_values(&stored.iter().map(|&v| v as i32).collect::<Vec<_>>(), ..)?,
        RawType::U32 => var.put_values(&stored.iter().map(|&v| v as u32).collect::<Vec<_>>(), ..)?,
        RawType::I64 => var.put_values(&stored.iter().map(|&v| v as i64).collect::<Vec<_>>(), ..)?,
        RawType::U64 => var.put_values(&stored.iter().map(|&v| v as u64).collect::<Vec<_>>(), ..)?,
        RawType::F32 => var.put_values(&stored.iter().map(|&v| v as f32).collect::<Vec<_>>(), ..)?,
        RawType::F64 => var.put_values(stored, ..)?,
    }
    Ok(())
}

fn describe(var: &netcdf::Variable, values: StoredValues) -> Variable {
    Variable {
        name: var.name(),
        dimensions: var.dimensions().iter().map(|d| d.name()).collect(),
        shape: var.dimensions().iter().map(netcdf::Dimension::len).collect(),
        values,
        packing: read_packing(var),
        fill_value: read_fill_value(var),
        valid_range: None,
    }
}

/// Read a variable with its stored values and packing metadata
///
/// # Errors
///
/// Returns an error if the variable is missing or cannot be read.
pub fn read_variable(file: &File, name: &str) -> Result<Variable> {
    let var = file
        .variable(name)
        .ok_or_else(|| Era5RadError::VariableNotFound {
            var: name.to_string(),
        })?;
    let values = read_stored(&var)?;
    Ok(describe(&var, values))
}

/// Physical values of a variable as an array of its own shape
///
/// # Errors
///
/// Returns an error if the variable is missing or cannot be read.
pub fn read_physical(file: &File, name: &str) -> Result<ArrayD<f64>> {
    let variable = read_variable(file, name)?;
    Ok(ArrayD::from_shape_vec(
        IxDyn(&variable.shape),
        variable.physical_values(),
    )?)
}

fn is_coordinate(file: &File, name: &str) -> bool {
    file.dimension(name).is_some()
}

/// Load data variables from `path`. An empty `names` loads every non-coordinate variable.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or a named variable is missing.
pub fn load_source(path: &Path, names: &[String]) -> Result<SourceFile> {
    let file = netcdf::open(path)?;
    let wanted: Vec<String> = if names.is_empty() {
        file.variables()
            .map(|v| v.name())
            .filter(|n| !is_coordinate(&file, n))
            .collect()
    } else {
        names.to_vec()
    };

    let mut source = SourceFile::new(&path.display().to_string());
    for name in &wanted {
        source.variables.push(read_variable(&file, name)?);
    }
    debug!(path = %path.display(), variables = source.variables.len(), "loaded source");
    Ok(source)
}

/// Load packing metadata of every non-coordinate variable, without reading values.
///
/// The returned variables carry empty value sequences.
///
/// # Errors
///
/// Returns an error if the file cannot be opened.
pub fn load_source_metadata(path: &Path) -> Result<SourceFile> {
    let file = netcdf::open(path)?;
    let mut source = SourceFile::new(&path.display().to_string());
    for var in file.variables() {
        if is_coordinate(&file, &var.name()) {
            continue;
        }
        source
            .variables
            .push(describe(&var, StoredValues::Float(Vec::new())));
    }
    Ok(source)
}

/// Concatenate the coordinate variable of the record dimension across `paths`.
///
/// Each file's coordinate is decoded with its own packing. Returns `None` when a
/// file has no coordinate variable for `dimension`.
///
/// # Errors
///
/// Returns an error if a file cannot be read.
pub fn load_record_coordinate(paths: &[PathBuf], dimension: &str) -> Result<Option<UnifiedVariable>> {
    let mut sources = Vec::with_capacity(paths.len());
    let mut units: Option<String> = None;
    for path in paths {
        let file = netcdf::open(path)?;
        let Some(var) = file.variable(dimension) else {
            debug!(path = %path.display(), dimension, "no record coordinate");
            return Ok(None);
        };
        let these = attribute_string(&var, "units");
        match &units {
            Some(first) if these.as_ref() != Some(first) => {
                warn!(path = %path.display(), dimension, units = ?these, expected = %first, "record coordinate units differ");
            }
            None => units = these,
            _ => {}
        }
        sources.push(SourceFile::new(&path.display().to_string()).with_variable(read_variable(&file, dimension)?));
    }
    if sources.is_empty() {
        return Ok(None);
    }
    resolve(&sources, dimension, ResolvePolicy::UnpackAll).map(Some)
}

/// Pressure coordinate of a variable: axis index, level values and their units
#[derive(Debug, Clone, PartialEq)]
pub struct PressureAxis {
    pub axis: usize,
    pub dimension: String,
    pub levels: Vec<f64>,
    pub units: String,
}

/// Find the dimension of `var_name` whose coordinate variable has pressure units
///
/// # Errors
///
/// Returns [`Era5RadError::DimensionNotFound`] when the variable has no pressure axis.
pub fn find_pressure_axis(
    file: &File,
    var_name: &str,
    converter: &UnitsConverter,
) -> Result<PressureAxis> {
    let var = file
        .variable(var_name)
        .ok_or_else(|| Era5RadError::VariableNotFound {
            var: var_name.to_string(),
        })?;

    for (axis, dim) in var.dimensions().iter().enumerate() {
        let dim_name = dim.name();
        if dim_name == var_name {
            continue;
        }
        let Some(coordinate) = file.variable(&dim_name) else {
            continue;
        };
        let Some(units) = attribute_string(&coordinate, "units") else {
            continue;
        };
        if converter.is_pressure(&units) {
            let levels = read_physical(file, &dim_name)?.into_raw_vec();
            return Ok(PressureAxis {
                axis,
                dimension: dim_name,
                levels,
                units,
            });
        }
    }

    Err(Era5RadError::DimensionNotFound {
        var: var_name.to_string(),
        dim: "pressure".to_string(),
    })
}

/// Name of the vertical dimension of remapped output
pub const SIGMA_DIMENSION: &str = "sigma_level";

/// A variable remapped from pressure levels onto sigma levels
#[derive(Debug, Clone)]
pub struct RemappedVariable {
    pub name: String,
    /// Dimension names of the variable on pressure levels
    pub dimensions: Vec<String>,
    pub level_axis: usize,
    pub pressure_units: String,
    pub result: RemapResult,
}

/// Every variable of a pressure-level file, remapped or copied
#[derive(Debug, Clone, Default)]
pub struct DatasetRemap {
    pub remapped: Vec<RemappedVariable>,
    /// Variables without a pressure axis
    pub copied: Vec<String>,
}

/// Multiplier taking a surface field into the units of the variable it closes.
///
/// Missing or identical units need no conversion.
///
/// # Errors
///
/// Returns [`Era5RadError::UnitsError`] for unknown or incompatible units.
pub fn surface_factor(
    converter: &UnitsConverter,
    surface_units: Option<&str>,
    variable_units: Option<&str>,
) -> Result<f64> {
    match (surface_units, variable_units) {
        (Some(from), Some(to)) if from.trim() != to.trim() => converter.convert(from, to),
        _ => Ok(1.0),
    }
}

fn units_of(file: &File, name: &str) -> Option<String> {
    file.variable(name).and_then(|v| attribute_string(&v, "units"))
}

/// Remap every variable of `levels` that has a pressure axis onto `grid`.
///
/// Columns are cut at the surface pressure of `single` and closed with the
/// surface field configured for the variable, converted to its units. Levels
/// stored top-down are reversed first.
///
/// # Errors
///
/// Returns an error if the surface pressure or a configured surface field is
/// missing, units cannot be converted, or shapes disagree.
pub fn remap_dataset(
    levels: &File,
    single: &File,
    vertical: &VerticalConfig,
    grid: &SigmaGrid,
    converter: &UnitsConverter,
) -> Result<DatasetRemap> {
    let sp_units = units_of(single, &vertical.surface_pressure).unwrap_or_else(|| "Pa".to_string());
    let sp = read_physical(single, &vertical.surface_pressure)?;

    let names: Vec<String> = levels
        .variables()
        .map(|v| v.name())
        .filter(|n| !is_coordinate(levels, n))
        .collect();

    let mut remap = DatasetRemap::default();
    for name in names {
        let axis = match find_pressure_axis(levels, &name, converter) {
            Ok(axis) => axis,
            Err(Era5RadError::DimensionNotFound { .. }) => {
                debug!(variable = %name, "no pressure axis, copying");
                remap.copied.push(name);
                continue;
            }
            Err(e) => return Err(e),
        };

        let var = read_variable(levels, &name)?;
        let mut values = ArrayD::from_shape_vec(IxDyn(&var.shape), var.physical_values())?;
        let mut pressure_levels = axis.levels.clone();
        if pressure_levels.first() > pressure_levels.last() {
            values.invert_axis(Axis(axis.axis));
            pressure_levels.reverse();
        }

        let sp_factor = converter.convert(&sp_units, &axis.units)?;
        let column_sp = sp.mapv(|v| v * sp_factor);
        let surface = match vertical.surface_variables.get(&name) {
            Some(surface_name) => {
                let factor = surface_factor(
                    converter,
                    units_of(single, surface_name).as_deref(),
                    units_of(levels, &name).as_deref(),
                )?;
                Some(read_physical(single, surface_name)?.mapv(|v| v * factor))
            }
            None => None,
        };

        let a_factor = converter.convert(&grid.units, &axis.units)?;
        info!(
            variable = %name,
            levels = pressure_levels.len(),
            surface = vertical.surface_variables.get(&name).map_or("lowest level", String::as_str),
            "vertical remap"
        );
        let result = remap_variable(
            grid,
            &values,
            axis.axis,
            &pressure_levels,
            &column_sp,
            surface.as_ref(),
            a_factor,
        )?;

        remap.remapped.push(RemappedVariable {
            name,
            dimensions: var.dimensions,
            level_axis: axis.axis,
            pressure_units: axis.units,
            result,
        });
    }
    Ok(remap)
}

fn copy_attributes(from: &netcdf::Variable, to: &mut netcdf::VariableMut, skip: &[&str]) -> Result<()> {
    for attr in from.attributes() {
        if skip.contains(&attr.name()) {
            continue;
        }
        let value = attr.value()?;
        to.put_attribute(attr.name(), value)?;
    }
    Ok(())
}

/// Copy a one-dimensional coordinate variable as unpacked f64
fn copy_coordinate(input: &File, output: &mut FileMut, name: &str) -> Result<()> {
    let Some(source) = input.variable(name) else {
        return Ok(());
    };
    if source.dimensions().len() != 1 {
        return Ok(());
    }
    let values = read_physical(input, name)?;
    let mut coordinate = output.add_variable::<f64>(name, &[name])?;
    copy_attributes(&source, &mut coordinate, &PACKING_ATTRIBUTES)?;
    coordinate.put(values.view(), ..)?;
    Ok(())
}

fn add_history(file: &mut FileMut, action: &str) -> Result<()> {
    file.add_attribute(
        "history",
        format!("{} by era5_rad on {}", action, Utc::now().to_rfc3339()),
    )?;
    Ok(())
}

/// Writer for unpacked variables, taking metadata from a template input file
pub struct NetCDFWriter<'a> {
    template: &'a File,
    output_path: &'a Path,
    record: Option<&'a UnifiedVariable>,
}

impl<'a> NetCDFWriter<'a> {
    /// Create a new NetCDF writer
    pub fn new(template: &'a File, output_path: &'a Path) -> Self {
        Self {
            template,
            output_path,
            record: None,
        }
    }

    /// Concatenated values of the record coordinate, see [`load_record_coordinate`]
    #[must_use]
    pub fn with_record_coordinate(mut self, record: &'a UnifiedVariable) -> Self {
        self.record = Some(record);
        self
    }

    /// Write a unified variable as f64 without packing attributes.
    ///
    /// Coordinate variables of the non-record dimensions are copied from the
    /// template; the record coordinate is written when one was supplied.
    pub fn write_unified(&self, unified: &UnifiedVariable) -> Result<()> {
        if self.output_path.exists() {
            fs::remove_file(self.output_path)?;
        }

        let mut file = netcdf::create(self.output_path)?;

        for (dim_name, &dim_len) in unified.dimensions.iter().zip(&unified.shape) {
            file.add_dimension(dim_name, dim_len)?;
        }
        for dim_name in unified.dimensions.iter().skip(1) {
            copy_coordinate(self.template, &mut file, dim_name)?;
        }
        if let Some(record) = self.record {
            self.write_record_coordinate(&mut file, unified, record)?;
        }

        let dim_refs: Vec<&str> = unified.dimensions.iter().map(|s| s.as_str()).collect();
        let data = ArrayD::from_shape_vec(IxDyn(&unified.shape), unified.values.clone())?;
        let mut new_var = file.add_variable::<f64>(&unified.name, &dim_refs)?;
        if let Some(orig_var) = self.template.variable(&unified.name) {
            copy_attributes(&orig_var, &mut new_var, &PACKING_ATTRIBUTES)?;
        }
        new_var.put(data.view(), ..)?;

        add_history(&mut file, "Unpacked and concatenated")?;
        info!(variable = %unified.name, path = %self.output_path.display(), "wrote unified variable");
        Ok(())
    }

    fn write_record_coordinate(
        &self,
        file: &mut FileMut,
        unified: &UnifiedVariable,
        record: &UnifiedVariable,
    ) -> Result<()> {
        let matches = unified.dimensions.first() == Some(&record.name)
            && record.shape.len() == 1
            && unified.shape.first() == record.shape.first();
        if !matches {
            warn!(
                coordinate = %record.name,
                shape = ?record.shape,
                "record coordinate does not fit the unified variable, not written"
            );
            return Ok(());
        }
        let mut coordinate = file.add_variable::<f64>(&record.name, &[record.name.as_str()])?;
        if let Some(source) = self.template.variable(&record.name) {
            copy_attributes(&source, &mut coordinate, &PACKING_ATTRIBUTES)?;
        }
        coordinate.put_values(&record.values, ..)?;
        Ok(())
    }

    fn ensure_dimension(&self, file: &mut FileMut, name: &str, len: usize) -> Result<()> {
        if file.dimension(name).is_some() {
            return Ok(());
        }
        file.add_dimension(name, len)?;
        copy_coordinate(self.template, file, name)
    }

    /// Write a remapped dataset: the remapped variables on `sigma_level`, the
    /// pressure `p` of every sigma level, and the copied variables unpacked.
    ///
    /// Coordinates of the remaining dimensions are copied from the template.
    pub fn write_vertical_remap(&self, remap: &DatasetRemap) -> Result<()> {
        if self.output_path.exists() {
            fs::remove_file(self.output_path)?;
        }
        let mut file = netcdf::create(self.output_path)?;

        for name in &remap.copied {
            let Some(source) = self.template.variable(name) else {
                continue;
            };
            let dims: Vec<(String, usize)> = source
                .dimensions()
                .iter()
                .map(|d| (d.name(), d.len()))
                .collect();
            for (dim, len) in &dims {
                self.ensure_dimension(&mut file, dim, *len)?;
            }
            let values = read_physical(self.template, name)?;
            let dim_refs: Vec<&str> = dims.iter().map(|(d, _)| d.as_str()).collect();
            let mut copied = file.add_variable::<f64>(name, &dim_refs)?;
            copy_attributes(&source, &mut copied, &PACKING_ATTRIBUTES)?;
            copied.put(values.view(), ..)?;
        }

        let mut wrote_pressure = false;
        for remapped in &remap.remapped {
            let shape = remapped.result.values.shape();
            let mut names = remapped.dimensions.clone();
            names[remapped.level_axis] = SIGMA_DIMENSION.to_string();

            if file.dimension(SIGMA_DIMENSION).is_none() {
                let nsigma = shape[remapped.level_axis];
                file.add_dimension(SIGMA_DIMENSION, nsigma)?;
                let mut sigma = file.add_variable::<i32>(SIGMA_DIMENSION, &[SIGMA_DIMENSION])?;
                #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                let levels: Vec<i32> = (1..=nsigma as i32).collect();
                sigma.put_values(&levels, ..)?;
            }
            for (axis, (name, &len)) in names.iter().zip(shape).enumerate() {
                if axis != remapped.level_axis {
                    self.ensure_dimension(&mut file, name, len)?;
                }
            }

            let dim_refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
            if !wrote_pressure {
                let mut p = file.add_variable::<f64>("p", &dim_refs)?;
                p.put_attribute("units", remapped.pressure_units.as_str())?;
                p.put_attribute("standard_name", "air_pressure")?;
                p.put(remapped.result.pressure.view(), ..)?;
                wrote_pressure = true;
            }

            let mut new_var = file.add_variable::<f64>(&remapped.name, &dim_refs)?;
            if let Some(orig_var) = self.template.variable(&remapped.name) {
                copy_attributes(&orig_var, &mut new_var, &PACKING_ATTRIBUTES)?;
            }
            new_var.put(remapped.result.values.view(), ..)?;
        }

        add_history(&mut file, "Vertically remapped")?;
        info!(
            remapped = remap.remapped.len(),
            copied = remap.copied.len(),
            path = %self.output_path.display(),
            "wrote vertically remapped dataset"
        );
        Ok(())
    }
}

/// Number of values replaced in one variable by [`remove_negatives`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegativeReplacement {
    pub variable: String,
    pub replaced: usize,
}

/// Replace negative physical values in place with the smallest positive packed value.
///
/// Coordinates, variables on the configured skip-list and unpacked variables are
/// left untouched.
///
/// # Errors
///
/// Returns an error if the file cannot be opened for appending or written.
pub fn remove_negatives(path: &Path, config: &Config) -> Result<Vec<NegativeReplacement>> {
    let mut file = netcdf::append(path)?;
    let names: Vec<String> = file
        .variables()
        .map(|v| v.name())
        .filter(|n| file.dimension(n).is_none() && !config.allows_negative(n))
        .collect();

    let mut replacements = Vec::new();
    for name in names {
        let Some(mut var) = file.variable_mut(&name) else {
            continue;
        };
        let Some(packing) = read_packing(&var) else {
            debug!(variable = %name, "skipping unpacked variable");
            continue;
        };
        let kind = RawType::of(&var)?;
        let fill = read_fill_value(&var);
        let mut stored = read_stored(&var)?.to_f64();

        let replaced = clamp_negatives(&mut stored, packing, fill);
        if replaced == 0 {
            continue;
        }
        write_stored(&mut var, kind, &stored)?;
        info!(variable = %name, replaced, "replaced negative values");
        replacements.push(NegativeReplacement {
            variable: name,
            replaced,
        });
    }
    Ok(replacements)
}
