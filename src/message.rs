//! Raster messages, timestep keys and grid coordinates
//!
//! A [`RasterMessage`] is one 2D field snapshot for one variable at one
//! `(valid_time, forecast_step)`. Messages are produced by a
//! [`MessageSource`](crate::source::MessageSource) and never mutated afterwards;
//! derivation rules build new messages instead.

use chrono::{DateTime, Utc};
use ndarray::{s, Array1, Array2, ArrayView2, Zip};
use std::fmt;
use std::str::FromStr;

/// Short identifier of a meteorological variable
///
/// The set is open: codes the engine has no special handling for are kept
/// verbatim in [`VariableCode::Other`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VariableCode {
    /// Eastward 10 metre wind component
    WindU,
    /// Northward 10 metre wind component
    WindV,
    /// 10 metre wind speed, derived from the two components
    WindSpeed,
    /// Snow depth
    SnowDepth,
    /// Any other variable, by its short name
    Other(String),
}

impl VariableCode {
    /// Canonical short name, as used in output files
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::WindU => "10u",
            Self::WindV => "10v",
            Self::WindSpeed => "10si",
            Self::SnowDepth => "sde",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for VariableCode {
    fn from(s: &str) -> Self {
        match s {
            "10u" | "u10" => Self::WindU,
            "10v" | "v10" => Self::WindV,
            "10si" | "si10" => Self::WindSpeed,
            "sde" => Self::SnowDepth,
            other => Self::Other(other.to_string()),
        }
    }
}

impl FromStr for VariableCode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for VariableCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one set of simultaneous observations or forecasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimestepKey {
    pub valid_time: DateTime<Utc>,
    /// Forecast lead time in hours
    pub forecast_step: i64,
}

impl TimestepKey {
    #[must_use]
    pub const fn new(valid_time: DateTime<Utc>, forecast_step: i64) -> Self {
        Self {
            valid_time,
            forecast_step,
        }
    }
}

impl fmt::Display for TimestepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (+{}h)",
            self.valid_time.format("%Y-%m-%d %H:%M"),
            self.forecast_step
        )
    }
}

/// One 2D field snapshot for a single variable and timestep
#[derive(Debug, Clone)]
pub struct RasterMessage {
    pub variable: VariableCode,
    pub values: Array2<f64>,
    /// Sentinel marking missing cells, if the source declares one
    pub missing_value: Option<f64>,
    /// Element-wise validity (`true` = valid), if the source carries one
    pub validity: Option<Array2<bool>>,
    pub valid_time: DateTime<Utc>,
    pub forecast_step: i64,
    pub level: Option<f64>,
    pub units: Option<String>,
}

impl RasterMessage {
    /// Create a message with no missing-value metadata
    #[must_use]
    pub fn new(variable: VariableCode, values: Array2<f64>, key: TimestepKey) -> Self {
        Self {
            variable,
            values,
            missing_value: None,
            validity: None,
            valid_time: key.valid_time,
            forecast_step: key.forecast_step,
            level: None,
            units: None,
        }
    }

    #[must_use]
    pub fn with_missing_value(mut self, missing_value: f64) -> Self {
        self.missing_value = Some(missing_value);
        self
    }

    #[must_use]
    pub fn with_validity(mut self, validity: Array2<bool>) -> Self {
        self.validity = Some(validity);
        self
    }

    #[must_use]
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: f64) -> Self {
        self.level = Some(level);
        self
    }

    #[must_use]
    pub const fn key(&self) -> TimestepKey {
        TimestepKey::new(self.valid_time, self.forecast_step)
    }

    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Cells holding a usable value
    ///
    /// A cell is valid when the element-wise validity array (if any) marks it
    /// valid, its value is not NaN, and it differs from the declared
    /// missing-value sentinel (if any). A NaN sentinel reduces to the NaN check.
    #[must_use]
    pub fn validity_mask(&self) -> Array2<bool> {
        let missing = self.missing_value.filter(|m| !m.is_nan());
        let mut mask = self.values.mapv(|v| {
            !v.is_nan() && missing.map_or(true, |m| v != m)
        });
        if let Some(validity) = &self.validity {
            if validity.dim() == mask.dim() {
                Zip::from(&mut mask)
                    .and(validity)
                    .for_each(|m, &valid| *m &= valid);
            } else {
                log::warn!(
                    "Ignoring validity array of '{}' with shape {:?} (values are {:?})",
                    self.variable,
                    validity.dim(),
                    mask.dim()
                );
            }
        }
        mask
    }
}

/// Keep every `stride`-th row and column, starting at the first
#[must_use]
pub fn subsample<T: Clone>(array: ArrayView2<'_, T>, stride: usize) -> Array2<T> {
    let step = stride.max(1) as isize;
    array.slice(s![..;step, ..;step]).to_owned()
}

/// 2D latitude and longitude of every grid cell
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub lats: Array2<f64>,
    pub lons: Array2<f64>,
}

impl Grid {
    /// Build a grid from already two-dimensional coordinate arrays
    ///
    /// # Errors
    ///
    /// Returns an error if the two arrays differ in shape.
    pub fn new(lats: Array2<f64>, lons: Array2<f64>) -> crate::Result<Self> {
        if lats.dim() != lons.dim() {
            return Err(crate::RegionAggError::GridUnavailable {
                message: format!(
                    "latitude shape {:?} differs from longitude shape {:?}",
                    lats.dim(),
                    lons.dim()
                ),
            });
        }
        Ok(Self { lats, lons })
    }

    /// Expand 1D latitude (rows) and longitude (columns) axes into a mesh
    #[must_use]
    pub fn from_axes(lats: &Array1<f64>, lons: &Array1<f64>) -> Self {
        let shape = (lats.len(), lons.len());
        Self {
            lats: Array2::from_shape_fn(shape, |(i, _)| lats[i]),
            lons: Array2::from_shape_fn(shape, |(_, j)| lons[j]),
        }
    }

    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.lats.dim()
    }

    /// Subsample both coordinate arrays by `stride`
    #[must_use]
    pub fn downsample(&self, stride: usize) -> Self {
        Self {
            lats: subsample(self.lats.view(), stride),
            lons: subsample(self.lons.view(), stride),
        }
    }
}
