//! Defines command-line interface options using `clap` for the regionagg binary.

use clap::Parser;
use regionagg::config::OutputMode;
use std::path::PathBuf;

/// Aggregate gridded meteorological fields into per-country means
#[derive(Parser, Debug)]
#[command(
    name = "regionagg",
    version,
    about = "Stream gridded fields into per-country averages"
)]
pub struct Args {
    /// Path to the NetCDF file holding the gridded fields
    pub data: PathBuf,

    /// GeoJSON file with the country polygons
    #[arg(
        short,
        long,
        default_value = "data/natural_earth_110m/ne_110m_admin_0_countries.geojson"
    )]
    pub polygons: PathBuf,

    /// Feature property holding the country code
    #[arg(long, default_value = "ADM0_A3")]
    pub code_field: String,

    /// Directory for the cached region map
    #[arg(long, default_value = "data")]
    pub cache_dir: PathBuf,

    /// Output directory. Defaults to the cache directory.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output mode: table, region-detail, region-means or variable-means
    #[arg(short, long, default_value = "table", value_parser = parse_mode_arg)]
    pub mode: OutputMode,

    /// Keep every Nth row and column of the grid
    #[arg(short, long, default_value_t = 1)]
    pub stride: usize,

    /// Decimal places for written values
    #[arg(long)]
    pub precision: Option<usize>,

    /// Number of threads for the spatial join. Defaults to number of CPU cores.
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Enable verbose output.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

fn parse_mode_arg(s: &str) -> Result<OutputMode, String> {
    s.parse::<OutputMode>().map_err(|e| e.to_string())
}
