//! Spatial join from grid cells to region codes, with a shape-keyed cache

use super::map::{RegionMap, Snapshot};
use super::polygons::CountryPolygons;
use crate::config::EngineConfig;
use crate::errors::Result;
use crate::message::Grid;
use ndarray::Array2;
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Map a longitude onto the [-180, 180] convention
#[must_use]
pub fn normalize_longitude(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else {
        lon
    }
}

/// Cache file for a region map of the given shape
#[must_use]
pub fn cache_path(cache_dir: &Path, shape: (usize, usize)) -> PathBuf {
    cache_dir.join(format!("region_map_{}x{}.json", shape.0, shape.1))
}

/// Builds [`RegionMap`]s and keeps them cached on disk
pub struct RegionMapBuilder<'a> {
    config: &'a EngineConfig,
}

impl<'a> RegionMapBuilder<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Subsample the full grid by the configured stride, then load the cached
    /// map for that shape or build and cache a new one
    ///
    /// # Errors
    ///
    /// Fails if a build is needed and the polygon dataset is missing or invalid,
    /// or if the cache directory cannot be written.
    pub fn load_or_build(&self, grid: &Grid) -> Result<RegionMap> {
        let stride = self.config.stride;
        let coords = if stride > 1 {
            grid.downsample(stride)
        } else {
            grid.clone()
        };
        let path = cache_path(&self.config.cache_dir, coords.shape());

        if let Some(map) = self.load_cached(&path, coords.shape()) {
            log::info!("Loaded cached region map: {}", path.display());
            return Ok(map);
        }

        let map = self.build(&coords)?;
        self.save(&map, &path)?;
        Ok(map)
    }

    /// Run the spatial join over the given (already subsampled) coordinates
    ///
    /// # Errors
    ///
    /// Fails if the polygon dataset is missing or cannot be parsed.
    pub fn build(&self, coords: &Grid) -> Result<RegionMap> {
        let polygons = CountryPolygons::load(&self.config.polygon_path, &self.config.code_field)?;
        self.build_with(coords, &polygons)
    }

    /// Run the spatial join against an already loaded polygon dataset
    ///
    /// # Errors
    ///
    /// Fails only if the resulting code array cannot be assembled.
    pub fn build_with(&self, coords: &Grid, polygons: &CountryPolygons) -> Result<RegionMap> {
        let shape = coords.shape();
        log::info!(
            "Creating region mapping for grid shape {}x{} ({} polygons, {} threads)",
            shape.0,
            shape.1,
            polygons.len(),
            rayon::current_num_threads()
        );

        let points: Vec<(f64, f64)> = coords
            .lons
            .iter()
            .zip(coords.lats.iter())
            .map(|(&lon, &lat)| (normalize_longitude(lon), lat))
            .collect();

        let unassigned = self.config.unassigned_code.as_str();
        let codes: Vec<&str> = points
            .par_iter()
            .map(|&(lon, lat)| {
                polygons
                    .locate(lon, lat)
                    .and_then(|polygon| polygon.code.as_deref())
                    .map(str::trim)
                    .filter(|code| !code.is_empty() && !self.is_non_country(code))
                    .unwrap_or(unassigned)
            })
            .collect();

        let codes = Array2::from_shape_vec(shape, codes)?;
        let map = RegionMap::from_codes(codes.view(), unassigned, self.config.stride)?;
        log::info!(
            "Region mapping assigned {} of {} cells to {} regions",
            map.land_cells(),
            shape.0 * shape.1,
            map.regions().len()
        );
        Ok(map)
    }

    fn is_non_country(&self, code: &str) -> bool {
        code == self.config.unassigned_code
            || self.config.non_country_codes.iter().any(|c| c == code)
    }

    fn load_cached(&self, path: &Path, shape: (usize, usize)) -> Option<RegionMap> {
        let file = File::open(path).ok()?;
        let snapshot: Snapshot = match serde_json::from_reader(BufReader::new(file)) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("Discarding unreadable region map cache {}: {e}", path.display());
                return None;
            }
        };
        let map = match RegionMap::from_snapshot(snapshot) {
            Ok(map) => map,
            Err(e) => {
                log::warn!("Discarding corrupt region map cache {}: {e}", path.display());
                return None;
            }
        };
        if map.dim() != shape || map.stride() != self.config.stride {
            log::warn!(
                "Discarding region map cache {} built for shape {:?} stride {} \
                 (need {:?} stride {})",
                path.display(),
                map.dim(),
                map.stride(),
                shape,
                self.config.stride
            );
            return None;
        }
        if map.unassigned_code() != self.config.unassigned_code {
            log::warn!(
                "Discarding region map cache {} using unassigned code '{}'",
                path.display(),
                map.unassigned_code()
            );
            return None;
        }
        Some(map)
    }

    fn save(&self, map: &RegionMap, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &map.to_snapshot())?;
        writer.flush()?;
        log::info!("Cached region map to {}", path.display());
        Ok(())
    }
}
