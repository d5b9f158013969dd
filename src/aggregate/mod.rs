//! Region-level aggregation of raster values
//!
//! # Organization
//!
//! - [`records`]: [`AggregateRecord`] and the per-cell [`CellRecord`]
//! - [`reduce`]: the masked per-region mean over a shared region map
//!
//! Means are unweighted and computed in `f64`; rounding is left to the sinks.

pub mod records;
pub mod reduce;

pub use records::{AggregateRecord, CellRecord};
pub use reduce::RegionAggregator;
