//! The streaming aggregation pipeline
//!
//! Message source → timestep buffer → derivations → region aggregator → sink,
//! in one single-threaded pass. Only one timestep's messages are held at a
//! time; the region map is built (or loaded) once and shared read-only.

use crate::aggregate::{AggregateRecord, RegionAggregator};
use crate::config::EngineConfig;
use crate::derive::{Derivations, VariableSet};
use crate::errors::{RegionAggError, Result};
use crate::message::Grid;
use crate::region::{RegionMap, RegionMapBuilder};
use crate::sink::OutputSink;
use crate::source::MessageSource;
use crate::timestep::{Batch, TimestepBuffer};
use std::fmt;

/// Counters describing one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Messages successfully read from the source
    pub messages_read: usize,
    /// Messages whose grid shape did not match and were dropped
    pub messages_skipped: usize,
    /// Messages the source failed to read
    pub read_errors: usize,
    /// Variables dropped during aggregation
    pub variables_skipped: usize,
    pub batches: usize,
    pub records: usize,
    pub cells: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} messages in {} timesteps -> {} records",
            self.messages_read, self.batches, self.records
        )?;
        if self.cells > 0 {
            write!(f, ", {} cells", self.cells)?;
        }
        if self.messages_skipped + self.read_errors + self.variables_skipped > 0 {
            write!(
                f,
                " ({} shape mismatches, {} read errors, {} variables skipped)",
                self.messages_skipped, self.read_errors, self.variables_skipped
            )?;
        }
        Ok(())
    }
}

/// A prepared aggregation run over one grid
pub struct Pipeline {
    map: RegionMap,
    coords: Grid,
    grid_shape: (usize, usize),
    derivations: Derivations,
}

impl Pipeline {
    /// Query the source's grid and load or build its region map
    ///
    /// # Errors
    ///
    /// Fatal errors only: invalid configuration, a source without a grid, or a
    /// region map that can be neither loaded nor built.
    pub fn prepare<S>(config: &EngineConfig, source: &mut S) -> Result<Self>
    where
        S: MessageSource + ?Sized,
    {
        config.validate()?;
        let grid = source.grid()?;
        let map = RegionMapBuilder::new(config).load_or_build(&grid)?;
        Self::new(map, &grid)
    }

    /// Use an existing region map for a full-resolution grid
    ///
    /// # Errors
    ///
    /// Fails if the grid, subsampled by the map's stride, does not have the
    /// map's shape.
    pub fn new(map: RegionMap, grid: &Grid) -> Result<Self> {
        let coords = grid.downsample(map.stride());
        if coords.shape() != map.dim() {
            return Err(RegionAggError::ShapeMismatch {
                variable: "region map".into(),
                expected: map.dim(),
                actual: coords.shape(),
            });
        }
        Ok(Self {
            map,
            coords,
            grid_shape: grid.shape(),
            derivations: Derivations::standard(),
        })
    }

    #[must_use]
    pub fn with_derivations(mut self, derivations: Derivations) -> Self {
        self.derivations = derivations;
        self
    }

    #[must_use]
    pub const fn region_map(&self) -> &RegionMap {
        &self.map
    }

    /// Stream every message of `source` into `sink`
    ///
    /// The sink is finished on every exit path, so its open targets are
    /// released before an error reaches the caller.
    ///
    /// # Errors
    ///
    /// Sink write failures and failures to finish the sink. Unreadable or
    /// misshapen messages are logged, counted and skipped.
    pub fn run<S, K>(&self, source: &mut S, sink: &mut K) -> Result<RunSummary>
    where
        S: MessageSource + ?Sized,
        K: OutputSink + ?Sized,
    {
        let streamed = self.stream(source, sink);
        let finished = sink.finish();
        let summary = streamed?;
        finished?;
        log::info!("Processing complete: {summary}");
        Ok(summary)
    }

    fn stream<S, K>(&self, source: &mut S, sink: &mut K) -> Result<RunSummary>
    where
        S: MessageSource + ?Sized,
        K: OutputSink + ?Sized,
    {
        let aggregator = RegionAggregator::new(&self.map).with_coordinates(&self.coords)?;
        let mut buffer = TimestepBuffer::new();
        let mut summary = RunSummary::default();

        for item in source.messages() {
            let message = match item {
                Ok(message) => message,
                Err(e) => {
                    log::warn!("Skipping unreadable message: {e}");
                    summary.read_errors += 1;
                    continue;
                }
            };
            summary.messages_read += 1;

            if message.shape() != self.grid_shape {
                log::warn!(
                    "Skipping '{}' at {}: grid {:?} does not match {:?}",
                    message.variable,
                    message.key(),
                    message.shape(),
                    self.grid_shape
                );
                summary.messages_skipped += 1;
                continue;
            }

            if let Some(batch) = buffer.push(message) {
                self.deliver(batch, &aggregator, sink, &mut summary)?;
            }
        }

        if let Some(batch) = buffer.finish() {
            self.deliver(batch, &aggregator, sink, &mut summary)?;
        }
        Ok(summary)
    }

    fn deliver<K>(
        &self,
        batch: Batch,
        aggregator: &RegionAggregator<'_>,
        sink: &mut K,
        summary: &mut RunSummary,
    ) -> Result<()>
    where
        K: OutputSink + ?Sized,
    {
        summary.batches += 1;
        log::debug!("Processing timestep {} ({} messages)", batch.key, batch.len());

        let mut set = VariableSet::from_batch(batch);
        self.derivations.apply(&mut set);

        for message in set.messages() {
            let records = match aggregator.aggregate(message) {
                Ok(records) => records,
                Err(e) => {
                    log::warn!("Skipping '{}' at {}: {e}", message.variable, set.key);
                    summary.variables_skipped += 1;
                    continue;
                }
            };
            sink.write_records(&records)?;
            summary.records += records.len();

            if sink.wants_cells() {
                let cells = aggregator.cells(message)?;
                sink.write_cells(&cells)?;
                summary.cells += cells.len();
            }
        }
        Ok(())
    }

    /// Derive and aggregate one batch without a sink
    #[must_use]
    pub fn process_batch(&self, batch: Batch) -> Vec<AggregateRecord> {
        let mut set = VariableSet::from_batch(batch);
        self.derivations.apply(&mut set);
        RegionAggregator::new(&self.map).aggregate_set(&set)
    }
}
