//! Centralized error handling for regionagg
//!
//! Errors fall into two groups. Fatal errors (missing polygon dataset, unreadable
//! input, missing grid definition) abort a run. Per-message errors such as
//! [`RegionAggError::ShapeMismatch`] are logged and absorbed by the pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for regionagg operations
#[derive(Error, Debug)]
pub enum RegionAggError {
    /// NetCDF file operation errors
    #[error("NetCDF error: {0}")]
    NetCDFError(#[from] netcdf::Error),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    ArrayError(#[from] ndarray::ShapeError),

    /// JSON (de)serialization error for the cache snapshot or GeoJSON input
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The polygon dataset needed to build a region map does not exist
    #[error("Polygon dataset not found: {}", path.display())]
    PolygonDatasetMissing { path: PathBuf },

    /// The polygon dataset exists but could not be interpreted
    #[error("Invalid polygon dataset: {message}")]
    PolygonDataset { message: String },

    /// The message source could not provide grid coordinates
    #[error("Grid definition unavailable: {message}")]
    GridUnavailable { message: String },

    /// Variable not found in the input file
    #[error("Variable '{var}' not found in file")]
    VariableNotFound { var: String },

    /// A raster does not line up with the region map
    #[error("Shape mismatch for '{variable}': expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        variable: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// A time coordinate could not be decoded
    #[error("Invalid time coordinate: {message}")]
    TimeDecode { message: String },

    /// Invalid engine configuration
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),
}

/// Result type alias for regionagg operations
pub type Result<T> = std::result::Result<T, RegionAggError>;
