//! Output sinks for aggregate records
//!
//! Two interchangeable modes:
//! - [`TableSink`] keeps every record in memory and persists one table at the end
//! - [`AppendSink`] streams rows into one append-mode CSV file per target
//!
//! The pipeline calls [`OutputSink::finish`] on every exit path, including
//! when a run aborts.

pub mod append;
pub mod table;

pub use append::{AppendSink, Layout};
pub use table::TableSink;

use crate::aggregate::{AggregateRecord, CellRecord};
use crate::errors::Result;

/// Destination for the records produced by one run
pub trait OutputSink {
    /// Consume the aggregate records of one timestep
    fn write_records(&mut self, records: &[AggregateRecord]) -> Result<()>;

    /// Whether the sink stores per-cell values; if so the pipeline also
    /// extracts them and calls [`OutputSink::write_cells`]
    fn wants_cells(&self) -> bool {
        false
    }

    /// Consume the valid land cells of one variable at one timestep
    fn write_cells(&mut self, _cells: &[CellRecord]) -> Result<()> {
        Ok(())
    }

    /// Flush and release everything the sink holds
    fn finish(&mut self) -> Result<()>;
}

/// Render a value with an optional fixed number of decimals
pub(crate) fn format_value(value: f64, precision: Option<usize>) -> String {
    match precision {
        Some(digits) => format!("{value:.digits$}"),
        None => value.to_string(),
    }
}
