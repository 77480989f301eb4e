//! era5_rad: ERA5 post-processing for clear-sky radiative transfer
//!
//! ERA5 downloads from the Copernicus Climate Data Store arrive as NetCDF files
//! whose fields are packed into 16-bit integers, with `scale_factor` and
//! `add_offset` chosen separately for every file. era5_rad prepares such files
//! for radiative-transfer calculations and guards the steps that quietly corrupt
//! them.
//!
//! ## Key Features
//!
//! - **Pack-Consistency Guard**: refuse, or unpack before, concatenating files whose packing differs
//! - **Plausibility Checks**: report values outside a physical range, clamp packed negatives
//! - **Orography Masking**: find pressure levels lying below the surface
//! - **Vertical Remapping**: pressure levels to a hybrid sigma grid, in parallel over columns
//! - **External Tools**: `ncrcat`, `ncpdq` and `cdo` driven as subprocesses
//! - **CDS Retrieval**: download of the ERA5 pressure- and single-level products
//!
//! ## Module Organization
//!
//! - [`guard`]: consistency check and resolution of packed variables across sources
//! - [`packing`]: packing parameters and the stored/physical transform
//! - [`plausibility`]: valid ranges, non-physical value detection, negative clamping
//! - [`orography`]: below-ground pressure level detection
//! - [`units`]: units conversion for pressure coordinates
//! - [`vertical`]: sigma grid and column remapping
//! - [`netcdf_io`]: reading packed variables and writing unpacked results
//! - [`metadata`]: file and packing inspection
//! - [`tools`]: external NetCDF operators
//! - [`download`]: CDS retrieval requests and client
//! - [`config`]: optional TOML configuration
//! - [`parallel`]: parallel processing configuration
//! - [`errors`]: centralized error handling
//!
//! ## Usage Example
//!
//! ```rust
//! use era5_rad::prelude::*;
//!
//! let first = SourceFile::new("2019-era5.nc").with_variable(
//!     Variable::new("alnid", StoredValues::Integer(vec![-19990, -19980])).with_packing(0.01, 200.0),
//! );
//! let second = SourceFile::new("2020-era5.nc").with_variable(
//!     Variable::new("alnid", StoredValues::Integer(vec![-9995])).with_packing(0.02, 200.0),
//! );
//! let sources = [first, second];
//!
//! assert!(!check_consistency(&sources, "alnid").unwrap().is_consistent());
//!
//! let unified = resolve(&sources, "alnid", ResolvePolicy::UnpackAll).unwrap();
//! assert_eq!(unified.shape, vec![3]);
//! ```

// Core modules
pub mod config;
pub mod download;
pub mod errors;
pub mod guard;
pub mod metadata;
pub mod netcdf_io;
pub mod orography;
pub mod packing;
pub mod parallel;
pub mod plausibility;
pub mod tools;
pub mod units;
pub mod vertical;

// Direct re-exports for the public API
pub use errors::*;
pub use guard::*;
pub use orography::*;
pub use packing::*;
pub use plausibility::*;

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::config::Config;
    pub use crate::errors::{Era5RadError, Result};
    pub use crate::guard::{
        check_consistency, resolve, ConsistencyResult, Divergence, ResolvePolicy, SourceFile,
        StoredValues, UnifiedVariable, Variable,
    };
    pub use crate::netcdf_io::NetCDFWriter;
    pub use crate::orography::{check_orography_masking, MaskedLevel};
    pub use crate::packing::PackingParams;
    pub use crate::parallel::ParallelConfig;
    pub use crate::plausibility::{detect_non_physical, ValidRange};
}
