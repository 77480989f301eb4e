//! Pack-consistency guard for concatenation of packed NetCDF sources
//!
//! Standard concatenation tools copy the packing attributes of the first input
//! into the output and append the stored integers of every input unchanged.
//! When the inputs were packed with different `scale_factor`/`add_offset`
//! pairs the tool may warn, but the output silently decodes every later input
//! with the wrong parameters. This module detects that situation before any
//! concatenation happens, and can produce a unified physical variable instead.

use crate::errors::{Era5RadError, Result};
use crate::packing::PackingParams;
use crate::plausibility::ValidRange;
use tracing::debug;

/// Raw values as they are stored in a file
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValues {
    /// Packed integer storage (`short`, `int`, ...)
    Integer(Vec<i64>),
    /// Floating point storage
    Float(Vec<f64>),
}

impl StoredValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Integer(v) => v.len(),
            Self::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored values widened to f64, without unpacking
    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Integer(v) => v.iter().map(|&x| x as f64).collect(),
            Self::Float(v) => v.clone(),
        }
    }
}

/// A variable of a source file, with its own packing metadata
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub dimensions: Vec<String>,
    pub shape: Vec<usize>,
    pub values: StoredValues,
    pub packing: Option<PackingParams>,
    /// Raw `_FillValue` / `missing_value`
    pub fill_value: Option<f64>,
    pub valid_range: Option<ValidRange>,
}

impl Variable {
    /// Create a one-dimensional variable along `time`
    pub fn new(name: &str, values: StoredValues) -> Self {
        let len = values.len();
        Self {
            name: name.to_string(),
            dimensions: vec!["time".to_string()],
            shape: vec![len],
            values,
            packing: None,
            fill_value: None,
            valid_range: None,
        }
    }

    #[must_use]
    pub fn with_packing(mut self, scale: f64, offset: f64) -> Self {
        self.packing = Some(PackingParams::new(scale, offset));
        self
    }

    #[must_use]
    pub fn with_fill_value(mut self, fill: f64) -> Self {
        self.fill_value = Some(fill);
        self
    }

    #[must_use]
    pub fn with_valid_range(mut self, range: ValidRange) -> Self {
        self.valid_range = Some(range);
        self
    }

    /// Replace dimension names and shape. The shape must account for every value.
    pub fn with_dimensions(mut self, dimensions: &[&str], shape: &[usize]) -> Result<Self> {
        let total: usize = shape.iter().product();
        if dimensions.len() != shape.len() || total != self.values.len() {
            return Err(Era5RadError::InvalidInput {
                message: format!(
                    "shape {:?} over dimensions {:?} does not hold {} values of '{}'",
                    shape,
                    dimensions,
                    self.values.len(),
                    self.name
                ),
            });
        }
        self.dimensions = dimensions.iter().map(|d| d.to_string()).collect();
        self.shape = shape.to_vec();
        Ok(self)
    }

    /// Packing parameters in effect; absent attributes behave as the identity
    pub fn effective_packing(&self) -> PackingParams {
        self.packing.unwrap_or_default()
    }

    /// Physical values decoded with this variable's own packing
    pub fn physical_values(&self) -> Vec<f64> {
        self.effective_packing()
            .unpack_all(&self.values.to_f64(), self.fill_value)
    }
}

/// A collection of variables loaded from one file
#[derive(Debug, Clone, Default)]
pub struct SourceFile {
    /// Path or other label identifying the source in reports
    pub label: String,
    pub variables: Vec<Variable>,
}

impl SourceFile {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            variables: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_variable(mut self, variable: Variable) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Names of variables carrying packing attributes
    pub fn packed_variable_names(&self) -> Vec<String> {
        self.variables
            .iter()
            .filter(|v| v.packing.is_some())
            .map(|v| v.name.clone())
            .collect()
    }
}

/// A source whose packing differs from the first source
#[derive(Debug, Clone, PartialEq)]
pub struct Divergence {
    pub source_index: usize,
    pub scale: f64,
    pub offset: f64,
}

/// Outcome of comparing packing parameters across sources
#[derive(Debug, Clone, PartialEq)]
pub enum ConsistencyResult {
    Consistent,
    Inconsistent(Vec<Divergence>),
}

impl ConsistencyResult {
    pub fn is_consistent(&self) -> bool {
        matches!(self, Self::Consistent)
    }
}

/// What to do when sources disagree on packing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ResolvePolicy {
    /// Refuse to combine a variable whose packing differs between sources
    FailOnMismatch,
    /// Decode every source with its own packing before combining
    #[default]
    UnpackAll,
}

/// A variable combined from several sources, holding physical values only
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedVariable {
    pub name: String,
    pub dimensions: Vec<String>,
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

fn lookup<'a>(source: &'a SourceFile, variable_name: &str) -> Result<&'a Variable> {
    source
        .variable(variable_name)
        .ok_or_else(|| Era5RadError::VariableNotFound {
            var: variable_name.to_string(),
        })
}

/// Compare the packing of `variable_name` in every source against the first source.
///
/// Parameters are metadata, so they are compared exactly.
///
/// # Errors
///
/// Returns an error if `sources` is empty or a source lacks the variable.
#[allow(clippy::float_cmp)]
pub fn check_consistency(sources: &[SourceFile], variable_name: &str) -> Result<ConsistencyResult> {
    let first = sources.first().ok_or_else(|| Era5RadError::InvalidInput {
        message: format!("no sources given for variable '{variable_name}'"),
    })?;
    let reference = lookup(first, variable_name)?.effective_packing();

    let mut divergent = Vec::new();
    for (index, source) in sources.iter().enumerate().skip(1) {
        let packing = lookup(source, variable_name)?.effective_packing();
        if packing.scale != reference.scale || packing.offset != reference.offset {
            debug!(
                variable = variable_name,
                source = %source.label,
                index,
                scale = packing.scale,
                offset = packing.offset,
                "packing differs from first source"
            );
            divergent.push(Divergence {
                source_index: index,
                scale: packing.scale,
                offset: packing.offset,
            });
        }
    }

    if divergent.is_empty() {
        Ok(ConsistencyResult::Consistent)
    } else {
        Ok(ConsistencyResult::Inconsistent(divergent))
    }
}

/// Combine `variable_name` from all sources along their first dimension.
///
/// # Errors
///
/// Returns [`Era5RadError::PackingMismatch`] under [`ResolvePolicy::FailOnMismatch`]
/// when the sources disagree, and [`Era5RadError::InvalidInput`] when the
/// trailing dimensions of the sources differ.
pub fn resolve(
    sources: &[SourceFile],
    variable_name: &str,
    policy: ResolvePolicy,
) -> Result<UnifiedVariable> {
    let consistency = check_consistency(sources, variable_name)?;
    if let (ResolvePolicy::FailOnMismatch, ConsistencyResult::Inconsistent(divergent)) =
        (policy, &consistency)
    {
        return Err(Era5RadError::PackingMismatch {
            variable: variable_name.to_string(),
            divergent: divergent.clone(),
        });
    }

    let variables = sources
        .iter()
        .map(|s| lookup(s, variable_name))
        .collect::<Result<Vec<_>>>()?;
    let first = variables[0];

    let mut shape = first.shape.clone();
    let mut values = Vec::new();
    for (index, variable) in variables.iter().enumerate() {
        if variable.shape.len() != first.shape.len()
            || variable.shape.iter().skip(1).ne(first.shape.iter().skip(1))
        {
            return Err(Era5RadError::InvalidInput {
                message: format!(
                    "source {} has shape {:?} for '{}', incompatible with {:?}",
                    index, variable.shape, variable_name, first.shape
                ),
            });
        }
        if index > 0 {
            if let Some(len) = shape.first_mut() {
                *len += variable.shape[0];
            }
        }
        values.extend(variable.physical_values());
    }

    // Scalars have no axis to concatenate along
    if shape.is_empty() {
        shape.push(values.len());
    }

    Ok(UnifiedVariable {
        name: variable_name.to_string(),
        dimensions: if first.dimensions.is_empty() {
            vec!["time".to_string()]
        } else {
            first.dimensions.clone()
        },
        shape,
        values,
    })
}
