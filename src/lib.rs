//! regionagg: streaming aggregation of gridded fields into region statistics
//!
//! regionagg turns global meteorological rasters (one field per variable per
//! timestep, read sequentially from a NetCDF file or any other message source)
//! into per-country means suitable for tabular analysis.
//!
//! ## Key Features
//!
//! - **Region Mapping**: point-in-polygon join of every grid cell against
//!   country polygons, cached on disk per grid shape
//! - **Streaming**: messages are grouped into timesteps on the fly, so memory
//!   stays bounded to one timestep regardless of file length
//! - **Derived Variables**: wind speed from its components and a snow depth
//!   floor, with room for more rules
//! - **Masking**: NaN, missing-value sentinels, validity arrays and ocean cells
//!   are excluded before averaging
//! - **Output**: one in-memory table, or append-mode CSV files per region or
//!   per variable
//!
//! ## Module Organization
//!
//! - [`message`]: raster messages, variable codes, timestep keys and grids
//! - [`source`]: the message stream abstraction
//! - [`netcdf_io`]: NetCDF-backed message source
//! - [`region`]: region map construction and caching
//! - [`timestep`]: grouping of the stream into per-timestep batches
//! - [`derive`]: derived variable rules
//! - [`aggregate`]: masked per-region means
//! - [`sink`]: table and streaming output
//! - [`pipeline`]: the end-to-end run
//! - [`config`], [`parallel`]: engine and thread pool configuration
//! - [`errors`]: centralized error handling
//!
//! ## Usage
//!
//! ```rust,no_run
//! use regionagg::prelude::*;
//!
//! let config = EngineConfig::default().with_stride(5);
//! let mut source = NetcdfSource::open("data/era5.nc")?;
//! let pipeline = Pipeline::prepare(&config, &mut source)?;
//!
//! let mut sink = TableSink::new();
//! let summary = pipeline.run(&mut source, &mut sink)?;
//! sink.write_csv(std::path::Path::new("data/country_variable_averages.csv"))?;
//! println!("{summary}");
//! # Ok::<(), regionagg::RegionAggError>(())
//! ```

pub mod aggregate;
pub mod config;
pub mod derive;
pub mod errors;
pub mod message;
pub mod netcdf_io;
pub mod parallel;
pub mod pipeline;
pub mod region;
pub mod sink;
pub mod source;
pub mod timestep;

pub use errors::{RegionAggError, Result};

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::aggregate::{AggregateRecord, CellRecord, RegionAggregator};
    pub use crate::config::{EngineConfig, OutputMode};
    pub use crate::derive::{DerivationRule, Derivations, VariableSet};
    pub use crate::errors::{RegionAggError, Result};
    pub use crate::message::{Grid, RasterMessage, TimestepKey, VariableCode};
    pub use crate::netcdf_io::NetcdfSource;
    pub use crate::parallel::ParallelConfig;
    pub use crate::pipeline::{Pipeline, RunSummary};
    pub use crate::region::{RegionMap, RegionMapBuilder};
    pub use crate::sink::{AppendSink, Layout, OutputSink, TableSink};
    pub use crate::source::{MemorySource, MessageSource};
    pub use crate::timestep::{Batch, IntoBatches, TimestepBuffer};
}
