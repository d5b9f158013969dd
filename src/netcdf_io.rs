//! NetCDF-backed message source
//!
//! Reads CF-convention files such as ERA5 downloads, where every data variable
//! is laid out as `(time, lat, lon)` or `(time, step, lat, lon)`. Each 2D slab
//! becomes one [`RasterMessage`]. Messages are emitted time-major, then by
//! forecast step, then by variable, so every timestep is contiguous.

use crate::errors::{RegionAggError, Result};
use crate::message::{Grid, RasterMessage, TimestepKey, VariableCode};
use crate::source::{MessageIter, MessageSource};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use ndarray::{Array1, Array2};
use netcdf::{AttributeValue, File, Variable};
use std::path::{Path, PathBuf};

/// Coordinate names tried when opening a file
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub lat_aliases: Vec<String>,
    pub lon_aliases: Vec<String>,
    pub time_aliases: Vec<String>,
    pub step_aliases: Vec<String>,
    /// Read only these variables; `None` reads every data variable
    pub variables: Option<Vec<String>>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            lat_aliases: vec!["latitude".into(), "lat".into()],
            lon_aliases: vec!["longitude".into(), "lon".into()],
            time_aliases: vec!["valid_time".into(), "time".into()],
            step_aliases: vec!["step".into()],
            variables: None,
        }
    }
}

impl ReaderConfig {
    pub fn with_variables(mut self, variables: Vec<String>) -> Self {
        self.variables = Some(variables);
        self
    }
}

/// One data variable and its dimensionality
#[derive(Debug, Clone)]
struct DataVariable {
    name: String,
    has_step: bool,
}

/// A NetCDF file read as a stream of raster messages
pub struct NetcdfSource {
    file: File,
    path: PathBuf,
    lat_name: String,
    lon_name: String,
    shape: (usize, usize),
    /// Decoded time coordinate, row-major over `(time, step)` when it is 2D
    times: Vec<DateTime<Utc>>,
    /// Length of the time dimension
    time_count: usize,
    /// Whether `times` holds one valid time per `(time, step)` pair
    times_per_step: bool,
    steps: Vec<i64>,
    variables: Vec<DataVariable>,
}

impl NetcdfSource {
    /// Open a file with the default coordinate aliases
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or lacks latitude, longitude or time
    /// coordinates. These errors are fatal for a run.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &ReaderConfig::default())
    }

    /// Open a file with custom coordinate aliases
    ///
    /// # Errors
    ///
    /// See [`NetcdfSource::open`].
    pub fn open_with(path: impl AsRef<Path>, config: &ReaderConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = netcdf::open(&path)?;

        let lat_name = find_variable(&file, &config.lat_aliases, "latitude")?;
        let lon_name = find_variable(&file, &config.lon_aliases, "longitude")?;
        let time_name = find_variable(&file, &config.time_aliases, "time")?;
        let step_name = config
            .step_aliases
            .iter()
            .find(|name| file.variable(name).is_some())
            .cloned();

        let (lat_dims, lon_dims) = (dim_names(&file, &lat_name), dim_names(&file, &lon_name));
        let (row_dim, col_dim, shape) = match (lat_dims.as_slice(), lon_dims.as_slice()) {
            ([lat], [lon]) => {
                let shape = (dim_len(&file, &lat_name, 0), dim_len(&file, &lon_name, 0));
                (lat.clone(), lon.clone(), shape)
            }
            ([y, x], [y2, x2]) if y == y2 && x == x2 => {
                let shape = (dim_len(&file, &lat_name, 0), dim_len(&file, &lat_name, 1));
                (y.clone(), x.clone(), shape)
            }
            _ => {
                return Err(RegionAggError::GridUnavailable {
                    message: format!(
                        "unsupported coordinate layout: \
                         {lat_name}{lat_dims:?}, {lon_name}{lon_dims:?}"
                    ),
                })
            }
        };

        let (steps, step_dim) = match &step_name {
            Some(name) => (
                decode_steps(&file, name)?,
                dim_names(&file, name).into_iter().next(),
            ),
            None => (vec![0], None),
        };

        // ERA5 forecast files carry valid_time as (time, step)
        let time_dims = dim_names(&file, &time_name);
        let (time_dim, times_per_step) = match time_dims.as_slice() {
            [t] => (t.clone(), false),
            [t, s] if Some(s) == step_dim.as_ref() => (t.clone(), true),
            _ => {
                return Err(RegionAggError::GridUnavailable {
                    message: format!(
                        "time coordinate {time_name}{time_dims:?} is neither (time) \
                         nor (time, step)"
                    ),
                })
            }
        };
        let time_count = dim_len(&file, &time_name, 0);
        let times = decode_times(&file, &time_name)?;

        let coordinates = [&lat_name, &lon_name, &time_name];
        let variables: Vec<DataVariable> = file
            .variables()
            .filter_map(|var| {
                let name = var.name().to_string();
                if coordinates.contains(&&name) || step_name.as_ref() == Some(&name) {
                    return None;
                }
                if let Some(wanted) = &config.variables {
                    if !wanted.contains(&name) {
                        return None;
                    }
                }
                let dims: Vec<String> = var
                    .dimensions()
                    .iter()
                    .map(|d| d.name().to_string())
                    .collect();
                match dims.as_slice() {
                    [t, y, x] if *t == time_dim && *y == row_dim && *x == col_dim => {
                        Some(DataVariable { name, has_step: false })
                    }
                    [t, s, y, x]
                        if *t == time_dim
                            && Some(s) == step_dim.as_ref()
                            && *y == row_dim
                            && *x == col_dim =>
                    {
                        Some(DataVariable { name, has_step: true })
                    }
                    _ => {
                        log::debug!("Ignoring variable '{name}' with dimensions {dims:?}");
                        None
                    }
                }
            })
            .collect();

        log::info!(
            "Opened {}: grid {}x{}, {} times, {} steps, variables [{}]",
            path.display(),
            shape.0,
            shape.1,
            time_count,
            steps.len(),
            variables.iter().map(|v| v.name.as_str()).collect::<Vec<_>>().join(", ")
        );

        Ok(Self {
            file,
            path,
            lat_name,
            lon_name,
            shape,
            times,
            time_count,
            times_per_step,
            steps,
            variables,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of the variables that will be streamed
    #[must_use]
    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }

    /// Decoded time coordinate; for a 2D `(time, step)` coordinate the values
    /// are laid out row-major
    #[must_use]
    pub fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    /// Valid time of the slab at time index `t` and step index `s`
    fn valid_time(&self, t: usize, s: usize) -> Result<DateTime<Utc>> {
        let index = if self.times_per_step {
            t * self.steps.len() + s
        } else {
            t
        };
        self.times
            .get(index)
            .copied()
            .ok_or_else(|| RegionAggError::TimeDecode {
                message: format!("no valid time for time index {t}, step index {s}"),
            })
    }

    /// Number of messages the stream will yield
    #[must_use]
    pub fn message_count(&self) -> usize {
        let per_time: usize = self
            .variables
            .iter()
            .map(|v| if v.has_step { self.steps.len() } else { 1 })
            .sum();
        self.time_count * per_time
    }

    fn read_message(&self, variable: &DataVariable, t: usize, s: usize) -> Result<RasterMessage> {
        let var = self
            .file
            .variable(&variable.name)
            .ok_or_else(|| RegionAggError::VariableNotFound {
                var: variable.name.clone(),
            })?;
        let (rows, cols) = self.shape;
        let raw: Vec<f64> = if variable.has_step {
            var.get_values::<f64, _>((t..t + 1, s..s + 1, 0..rows, 0..cols))?
        } else {
            var.get_values::<f64, _>((t..t + 1, 0..rows, 0..cols))?
        };

        let fill = attr_f64(&var, "_FillValue").or_else(|| attr_f64(&var, "missing_value"));
        let scale = attr_f64(&var, "scale_factor").unwrap_or(1.0);
        let offset = attr_f64(&var, "add_offset").unwrap_or(0.0);

        let validity: Vec<bool> = raw
            .iter()
            .map(|&x| fill.map_or(true, |f| x != f))
            .collect();
        let values: Vec<f64> = raw.into_iter().map(|x| x * scale + offset).collect();

        let s = if variable.has_step { s } else { 0 };
        let key = TimestepKey::new(self.valid_time(t, s)?, self.steps[s]);
        let mut message = RasterMessage::new(
            VariableCode::from(variable.name.as_str()),
            Array2::from_shape_vec(self.shape, values)?,
            key,
        );
        if fill.is_some() {
            message = message.with_validity(Array2::from_shape_vec(self.shape, validity)?);
        }
        if let Some(units) = attr_str(&var, "units") {
            message = message.with_units(units);
        }
        Ok(message)
    }
}

impl MessageSource for NetcdfSource {
    fn grid(&mut self) -> Result<Grid> {
        let lat = read_coordinate(&self.file, &self.lat_name)?;
        let lon = read_coordinate(&self.file, &self.lon_name)?;
        match (lat.len(), lon.len()) {
            (rows, cols) if rows == self.shape.0 && cols == self.shape.1 => {
                Ok(Grid::from_axes(&Array1::from(lat), &Array1::from(lon)))
            }
            (n, m) if n == m && n == self.shape.0 * self.shape.1 => Grid::new(
                Array2::from_shape_vec(self.shape, lat)?,
                Array2::from_shape_vec(self.shape, lon)?,
            ),
            (n, m) => Err(RegionAggError::GridUnavailable {
                message: format!(
                    "{n} latitudes and {m} longitudes do not describe a {:?} grid",
                    self.shape
                ),
            }),
        }
    }

    fn messages(&mut self) -> MessageIter<'_> {
        let this = &*self;
        let step_count = this.steps.len();
        let plan = (0..this.time_count).flat_map(move |t| {
            (0..step_count).flat_map(move |s| {
                this.variables
                    .iter()
                    // variables without a step dimension appear once per time
                    .filter(move |v| v.has_step || s == 0)
                    .map(move |v| (v, t, s))
            })
        });
        Box::new(plan.map(move |(variable, t, s)| {
            this.read_message(variable, t, s).map_err(|e| {
                log::debug!("Failed to read '{}' at time index {t}: {e}", variable.name);
                e
            })
        }))
    }
}

fn find_variable(file: &File, aliases: &[String], what: &str) -> Result<String> {
    aliases
        .iter()
        .find(|name| file.variable(name).is_some())
        .cloned()
        .ok_or_else(|| RegionAggError::GridUnavailable {
            message: format!("no {what} coordinate (tried {})", aliases.join(", ")),
        })
}

fn dim_names(file: &File, name: &str) -> Vec<String> {
    file.variable(name)
        .map(|v| v.dimensions().iter().map(|d| d.name().to_string()).collect())
        .unwrap_or_default()
}

fn dim_len(file: &File, name: &str, index: usize) -> usize {
    file.variable(name)
        .and_then(|v| v.dimensions().get(index).map(netcdf::Dimension::len))
        .unwrap_or(0)
}

fn read_coordinate(file: &File, name: &str) -> Result<Vec<f64>> {
    let var = file
        .variable(name)
        .ok_or_else(|| RegionAggError::VariableNotFound { var: name.into() })?;
    Ok(var.get_values::<f64, _>(..)?)
}

fn attr_f64(var: &Variable, name: &str) -> Option<f64> {
    var.attribute_value(name)
        .and_then(|r| r.ok())
        .and_then(|v| match v {
            AttributeValue::Double(d) => Some(d),
            AttributeValue::Float(f) => Some(f64::from(f)),
            AttributeValue::Short(s) => Some(f64::from(s)),
            AttributeValue::Ushort(s) => Some(f64::from(s)),
            AttributeValue::Int(i) => Some(f64::from(i)),
            AttributeValue::Uint(i) => Some(f64::from(i)),
            AttributeValue::Schar(c) => Some(f64::from(c)),
            AttributeValue::Uchar(c) => Some(f64::from(c)),
            AttributeValue::Longlong(l) => Some(l as f64),
            AttributeValue::Doubles(d) => d.first().copied(),
            AttributeValue::Floats(f) => f.first().copied().map(f64::from),
            _ => None,
        })
}

fn attr_str(var: &Variable, name: &str) -> Option<String> {
    var.attribute_value(name)
        .and_then(|r| r.ok())
        .and_then(|v| match v {
            AttributeValue::Str(s) => Some(s),
            _ => None,
        })
}

fn decode_times(file: &File, name: &str) -> Result<Vec<DateTime<Utc>>> {
    let var = file
        .variable(name)
        .ok_or_else(|| RegionAggError::VariableNotFound { var: name.into() })?;
    let units = attr_str(&var, "units").ok_or_else(|| RegionAggError::TimeDecode {
        message: format!("time coordinate '{name}' has no units"),
    })?;
    let values: Vec<f64> = var.get_values::<f64, _>(..)?;
    values.into_iter().map(|v| decode_cf_time(v, &units)).collect()
}

fn decode_steps(file: &File, name: &str) -> Result<Vec<i64>> {
    let var = file
        .variable(name)
        .ok_or_else(|| RegionAggError::VariableNotFound { var: name.into() })?;
    let seconds_per_unit = match attr_str(&var, "units") {
        Some(units) => unit_seconds(units.trim())?,
        None => 3600.0,
    };
    let values: Vec<f64> = var.get_values::<f64, _>(..)?;
    Ok(values
        .into_iter()
        .map(|v| (v * seconds_per_unit / 3600.0).round() as i64)
        .collect())
}

fn unit_seconds(unit: &str) -> Result<f64> {
    match unit.to_ascii_lowercase().as_str() {
        "seconds" | "second" | "secs" | "sec" | "s" => Ok(1.0),
        "minutes" | "minute" | "mins" | "min" => Ok(60.0),
        "hours" | "hour" | "hrs" | "hr" | "h" => Ok(3600.0),
        "days" | "day" | "d" => Ok(86_400.0),
        other => Err(RegionAggError::TimeDecode {
            message: format!("unsupported time unit '{other}'"),
        }),
    }
}

/// Decode one CF time value such as `24.0` with units `hours since 1900-01-01`
///
/// # Errors
///
/// Fails on units without a `since` reference, unknown units, an
/// unparseable reference date, or an offset outside the representable range
/// (such as an unmasked fill value).
pub fn decode_cf_time(value: f64, units: &str) -> Result<DateTime<Utc>> {
    let (unit, reference) =
        units
            .split_once(" since ")
            .ok_or_else(|| RegionAggError::TimeDecode {
                message: format!("expected '<unit> since <date>', got '{units}'"),
            })?;
    let seconds_per_unit = unit_seconds(unit.trim())?;
    let epoch = parse_reference(reference)?;

    let out_of_range = || RegionAggError::TimeDecode {
        message: format!("time value {value} {units} is out of range"),
    };
    let millis = (value * seconds_per_unit * 1000.0).round();
    // i64::MAX as f64 rounds up, so the upper bound is exclusive
    if !millis.is_finite() || millis < i64::MIN as f64 || millis >= i64::MAX as f64 {
        return Err(out_of_range());
    }
    TimeDelta::try_milliseconds(millis as i64)
        .and_then(|offset| epoch.checked_add_signed(offset))
        .ok_or_else(out_of_range)
}

fn parse_reference(reference: &str) -> Result<DateTime<Utc>> {
    let cleaned = reference
        .trim()
        .trim_end_matches("UTC")
        .trim_end_matches('Z')
        .trim()
        .replace('T', " ");
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&cleaned, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(&cleaned, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| RegionAggError::TimeDecode {
            message: format!("unparseable reference date '{reference}'"),
        })
}
