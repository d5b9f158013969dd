//! Entry point for the regionagg binary.
//! Handles CLI parsing, builds or loads the region map and streams the input into the chosen sink.

use clap::Parser;
use regionagg::prelude::*;
use std::path::PathBuf;
mod cli;

use cli::Args;

const TABLE_FILE: &str = "country_variable_averages.csv";

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    let config = EngineConfig::default()
        .with_polygon_path(&args.polygons)
        .with_code_field(args.code_field.as_str())
        .with_cache_dir(&args.cache_dir)
        .with_stride(args.stride)
        .with_output_mode(args.mode)
        .with_precision(args.precision)
        .with_parallel(match args.threads {
            Some(n) => ParallelConfig::with_threads(n),
            None => ParallelConfig::all_cores(),
        });
    config.validate()?;
    config.parallel.setup_global_pool()?;

    let mut source = NetcdfSource::open(&args.data)?;
    log::info!(
        "Opened {} ({} variables: {})",
        args.data.display(),
        source.variable_names().len(),
        source.variable_names().join(", ")
    );

    let pipeline = Pipeline::prepare(&config, &mut source)?;
    let map = pipeline.region_map();
    log::info!(
        "Region map {}x{} (stride {}): {} regions over {} land cells",
        map.dim().0,
        map.dim().1,
        map.stride(),
        map.regions().len(),
        map.land_cells()
    );

    let output_dir = args.output.unwrap_or_else(|| config.cache_dir.clone());
    let summary = match Layout::for_mode(config.output_mode) {
        None => {
            let mut sink = TableSink::new().with_precision(config.precision);
            let summary = pipeline.run(&mut source, &mut sink)?;
            std::fs::create_dir_all(&output_dir)?;
            let path: PathBuf = output_dir.join(TABLE_FILE);
            sink.write_csv(&path)?;
            println!("✅ Saved {} records to {}", sink.len(), path.display());
            summary
        }
        Some(layout) => {
            let mut sink =
                AppendSink::new(&output_dir, layout)?.with_precision(config.precision);
            let summary = pipeline.run(&mut source, &mut sink)?;
            println!(
                "✅ Appended {} output files in {}",
                sink.targets_opened(),
                output_dir.display()
            );
            summary
        }
    };

    println!("{summary}");
    Ok(())
}
