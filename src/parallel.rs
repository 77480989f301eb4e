//! Rayon pool setup for the column loop of the vertical remap
//!
//! The guard, the NetCDF readers and the tool wrappers are single-threaded.

use crate::errors::{Era5RadError, Result};
use rayon::ThreadPoolBuilder;
use tracing::info;

/// Thread count requested on the command line, if any
#[derive(Debug, Clone, Default)]
pub struct ParallelConfig {
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    pub fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    /// Size the global Rayon pool. Without a thread count Rayon's default is kept.
    ///
    /// # Errors
    ///
    /// Returns [`Era5RadError::ThreadPoolError`] for a zero thread count or when
    /// the global pool was already built.
    pub fn setup_global_pool(&self) -> Result<usize> {
        let Some(num_threads) = self.num_threads else {
            return Ok(rayon::current_num_threads());
        };
        if num_threads == 0 {
            return Err(Era5RadError::ThreadPoolError(
                "thread count must be at least 1".to_string(),
            ));
        }
        ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .map_err(|e| {
                Era5RadError::ThreadPoolError(format!(
                    "Failed to initialize thread pool with {} threads: {}",
                    num_threads, e
                ))
            })?;
        info!(threads = num_threads, "configured remap thread pool");
        Ok(num_threads)
    }
}

/// Threads in the global pool against the cores of the machine
#[derive(Debug, Clone)]
pub struct ParallelInfo {
    pub current_threads: usize,
    pub available_cores: usize,
}

pub fn get_parallel_info() -> ParallelInfo {
    ParallelInfo {
        current_threads: rayon::current_num_threads(),
        available_cores: num_cpus::get(),
    }
}

impl ParallelInfo {
    pub fn print_info(&self) {
        println!("📊 Parallel Processing Information:");
        println!("   Current threads: {}", self.current_threads);
        println!("   Available CPU cores: {}", self.available_cores);
    }
}
