//! In-memory table of all aggregate records

use super::{format_value, OutputSink};
use crate::aggregate::AggregateRecord;
use crate::errors::Result;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Column header of the combined table
pub const TABLE_HEADER: &str = "valid_time,forecast_step,region_code,variable_code,value";

/// Accumulates every record of a run; the caller persists it once at the end
#[derive(Debug, Default)]
pub struct TableSink {
    records: Vec<AggregateRecord>,
    precision: Option<usize>,
}

impl TableSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_precision(mut self, precision: Option<usize>) -> Self {
        self.precision = precision;
        self
    }

    #[must_use]
    pub fn records(&self) -> &[AggregateRecord] {
        &self.records
    }

    #[must_use]
    pub fn into_records(self) -> Vec<AggregateRecord> {
        self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write the combined table as CSV, replacing any existing file
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file or its directory cannot be written.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "{TABLE_HEADER}")?;
        for record in &self.records {
            writeln!(
                writer,
                "{},{},{},{},{}",
                record.valid_time.format("%Y-%m-%d %H:%M:%S"),
                record.forecast_step,
                record.region,
                record.variable,
                format_value(record.value, self.precision)
            )?;
        }
        writer.flush()?;
        log::info!("Saved {} rows to {}", self.records.len(), path.display());
        Ok(())
    }
}

impl OutputSink for TableSink {
    fn write_records(&mut self, records: &[AggregateRecord]) -> Result<()> {
        self.records.extend_from_slice(records);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
