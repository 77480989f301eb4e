//! Centralized error handling for era5_rad
//!
//! This module provides the structured error type shared by the guard, the
//! NetCDF readers and writers, and the external tool wrappers.

use crate::guard::Divergence;
use std::fmt;

/// Main error type for era5_rad operations
#[derive(Debug)]
pub enum Era5RadError {
    /// NetCDF file operation errors
    NetCDFError(netcdf::Error),

    /// I/O operation errors
    IoError(std::io::Error),

    /// Array shape or dimension error
    ArrayError(ndarray::ShapeError),

    /// Variable not found in a source
    VariableNotFound { var: String },

    /// Dimension not found in variable
    DimensionNotFound { var: String, dim: String },

    /// Sources disagree on (scale_factor, add_offset) for a variable
    PackingMismatch {
        variable: String,
        divergent: Vec<Divergence>,
    },

    /// Arguments that cannot be processed (empty source lists, shape mismatches, ...)
    InvalidInput { message: String },

    /// Unknown or incompatible units
    UnitsError { message: String },

    /// An external tool is not installed or not on PATH
    ToolNotFound { tool: String },

    /// An external tool exited unsuccessfully
    ToolFailed { tool: String, status: String },

    /// Configuration file could not be read or parsed
    ConfigError(String),

    /// JSON serialization errors
    SerializationError(serde_json::Error),

    /// Thread pool configuration error
    ThreadPoolError(String),

    /// HTTP transport errors talking to the Climate Data Store
    HttpError(reqwest::Error),

    /// A CDS retrieval job was rejected, failed or could not be parsed
    RetrievalFailed { dataset: String, message: String },
}

impl fmt::Display for Era5RadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Era5RadError::NetCDFError(e) => write!(f, "NetCDF error: {}", e),
            Era5RadError::IoError(e) => write!(f, "I/O error: {}", e),
            Era5RadError::ArrayError(e) => write!(f, "Array error: {}", e),
            Era5RadError::VariableNotFound { var } => {
                write!(f, "Variable '{}' not found in source", var)
            }
            Era5RadError::DimensionNotFound { var, dim } => {
                write!(f, "Dimension '{}' not found in variable '{}'", dim, var)
            }
            Era5RadError::PackingMismatch {
                variable,
                divergent,
            } => {
                let sources: Vec<String> = divergent
                    .iter()
                    .map(|d| {
                        format!(
                            "source {} (scale_factor={}, add_offset={})",
                            d.source_index, d.scale, d.offset
                        )
                    })
                    .collect();
                write!(
                    f,
                    "Packing mismatch for variable '{}': {}",
                    variable,
                    sources.join(", ")
                )
            }
            Era5RadError::InvalidInput { message } => write!(f, "Invalid input: {}", message),
            Era5RadError::UnitsError { message } => write!(f, "Units error: {}", message),
            Era5RadError::ToolNotFound { tool } => {
                write!(f, "External tool '{}' not found, you must have it installed", tool)
            }
            Era5RadError::ToolFailed { tool, status } => {
                write!(f, "External tool '{}' failed: {}", tool, status)
            }
            Era5RadError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Era5RadError::SerializationError(e) => write!(f, "Serialization error: {}", e),
            Era5RadError::ThreadPoolError(msg) => write!(f, "Thread pool error: {}", msg),
            Era5RadError::HttpError(e) => write!(f, "HTTP error: {}", e),
            Era5RadError::RetrievalFailed { dataset, message } => {
                write!(f, "Retrieval of '{}' failed: {}", dataset, message)
            }
        }
    }
}

impl std::error::Error for Era5RadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Era5RadError::NetCDFError(e) => Some(e),
            Era5RadError::IoError(e) => Some(e),
            Era5RadError::ArrayError(e) => Some(e),
            Era5RadError::SerializationError(e) => Some(e),
            Era5RadError::HttpError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<netcdf::Error> for Era5RadError {
    fn from(error: netcdf::Error) -> Self {
        Era5RadError::NetCDFError(error)
    }
}

impl From<std::io::Error> for Era5RadError {
    fn from(error: std::io::Error) -> Self {
        Era5RadError::IoError(error)
    }
}

impl From<ndarray::ShapeError> for Era5RadError {
    fn from(error: ndarray::ShapeError) -> Self {
        Era5RadError::ArrayError(error)
    }
}

impl From<serde_json::Error> for Era5RadError {
    fn from(error: serde_json::Error) -> Self {
        Era5RadError::SerializationError(error)
    }
}

impl From<toml::de::Error> for Era5RadError {
    fn from(error: toml::de::Error) -> Self {
        Era5RadError::ConfigError(error.to_string())
    }
}

impl From<reqwest::Error> for Era5RadError {
    fn from(error: reqwest::Error) -> Self {
        Era5RadError::HttpError(error)
    }
}

/// Result type alias for era5_rad operations
pub type Result<T> = std::result::Result<T, Era5RadError>;
