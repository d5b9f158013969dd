//! Engine configuration
//!
//! One [`EngineConfig`] parameterizes what used to be separate processing
//! variants: the stride factor, the output mode and the region-map policy are
//! all plain settings here.

use crate::errors::{RegionAggError, Result};
use crate::parallel::ParallelConfig;
use std::path::{Path, PathBuf};

/// Default sentinel for cells that belong to no region
pub const UNASSIGNED_CODE: &str = "XXX";

/// How aggregate output is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// One in-memory table for the whole run, persisted once at the end
    Table,
    /// One append file per region with every valid land cell
    RegionDetail,
    /// One append file per region with the regional means
    RegionMeans,
    /// One append file per variable with the regional means
    VariableMeans,
}

impl OutputMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::RegionDetail => "region-detail",
            Self::RegionMeans => "region-means",
            Self::VariableMeans => "variable-means",
        }
    }

    /// Whether the mode writes incrementally while the stream is read
    #[must_use]
    pub const fn is_streaming(self) -> bool {
        !matches!(self, Self::Table)
    }
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutputMode {
    type Err = RegionAggError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "table" => Ok(Self::Table),
            "region-detail" => Ok(Self::RegionDetail),
            "region-means" => Ok(Self::RegionMeans),
            "variable-means" => Ok(Self::VariableMeans),
            other => Err(RegionAggError::Config {
                message: format!(
                    "unknown output mode '{other}' \
                     (expected table, region-detail, region-means or variable-means)"
                ),
            }),
        }
    }
}

/// Settings for building the region map and running the pipeline
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// GeoJSON file with one (multi)polygon per country
    pub polygon_path: PathBuf,
    /// Feature property holding the country code
    pub code_field: String,
    /// Code assigned to ocean cells and cells outside every polygon
    pub unassigned_code: String,
    /// Polygon codes that do not denote a country; mapped to the unassigned code
    pub non_country_codes: Vec<String>,
    /// Directory holding the region map cache and default outputs
    pub cache_dir: PathBuf,
    /// Subsampling factor applied to coordinates and values (1 = full grid)
    pub stride: usize,
    pub output_mode: OutputMode,
    /// Decimal places for written values; `None` keeps full precision
    pub precision: Option<usize>,
    pub parallel: ParallelConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            polygon_path: PathBuf::from(
                "data/natural_earth_110m/ne_110m_admin_0_countries.geojson",
            ),
            code_field: "ADM0_A3".into(),
            unassigned_code: UNASSIGNED_CODE.into(),
            non_country_codes: vec!["-99".into()],
            cache_dir: PathBuf::from("data"),
            stride: 1,
            output_mode: OutputMode::Table,
            precision: None,
            parallel: ParallelConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_polygon_path(mut self, path: impl AsRef<Path>) -> Self {
        self.polygon_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_code_field(mut self, field: impl Into<String>) -> Self {
        self.code_field = field.into();
        self
    }

    pub fn with_unassigned_code(mut self, code: impl Into<String>) -> Self {
        self.unassigned_code = code.into();
        self
    }

    pub fn with_non_country_codes(mut self, codes: Vec<String>) -> Self {
        self.non_country_codes = codes;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cache_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    pub fn with_precision(mut self, precision: Option<usize>) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_parallel(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }

    /// Check settings that would otherwise fail deep inside a run
    ///
    /// # Errors
    ///
    /// Returns [`RegionAggError::Config`] for a zero stride, an empty code field
    /// or an empty unassigned code.
    pub fn validate(&self) -> Result<()> {
        if self.stride == 0 {
            return Err(RegionAggError::Config {
                message: "stride must be at least 1".into(),
            });
        }
        if self.code_field.trim().is_empty() {
            return Err(RegionAggError::Config {
                message: "code field must not be empty".into(),
            });
        }
        if self.unassigned_code.is_empty() {
            return Err(RegionAggError::Config {
                message: "unassigned code must not be empty".into(),
            });
        }
        Ok(())
    }
}
