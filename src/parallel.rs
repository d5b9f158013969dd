//! Parallel processing configuration
//!
//! Only the one-time spatial join runs on the Rayon pool; the streaming
//! pipeline itself is single-threaded.

use crate::errors::{RegionAggError, Result};
use rayon::ThreadPoolBuilder;

/// Configuration for the thread pool used by the spatial join
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParallelConfig {
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    /// Create a configuration that uses all available CPU cores
    pub fn all_cores() -> Self {
        Self {
            num_threads: Some(num_cpus::get()),
        }
    }

    /// Create a configuration that uses a specific number of threads
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
        }
    }

    /// Set up the global Rayon thread pool with the specified configuration
    ///
    /// # Errors
    ///
    /// Fails if the global pool was already initialized or the thread count is zero.
    pub fn setup_global_pool(&self) -> Result<()> {
        if let Some(num_threads) = self.num_threads {
            ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .build_global()
                .map_err(|e| {
                    RegionAggError::ThreadPoolError(format!(
                        "Failed to initialize thread pool with {} threads: {}",
                        num_threads, e
                    ))
                })?;

            log::info!("Configured spatial join with {} threads", num_threads);
        } else {
            log::debug!("Using default thread pool configuration");
        }

        Ok(())
    }
}
