//! Region mask construction
//!
//! This module assigns every grid cell a region (country) code through a
//! point-in-polygon join, and caches the result per grid shape.
//!
//! # Organization
//!
//! - [`map`]: the interned, read-only [`RegionMap`]
//! - [`polygons`]: GeoJSON country polygons
//! - [`builder`]: the spatial join and the on-disk cache

pub mod builder;
pub mod map;
pub mod polygons;

pub use builder::{cache_path, normalize_longitude, RegionMapBuilder};
pub use map::RegionMap;
pub use polygons::{CountryPolygon, CountryPolygons};
