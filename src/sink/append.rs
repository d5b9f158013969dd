//! Streaming per-target CSV files

use super::{format_value, OutputSink};
use crate::aggregate::{AggregateRecord, CellRecord};
use crate::config::OutputMode;
use crate::errors::{RegionAggError, Result};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// How rows are split into files and what columns they carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One file per region, one row per valid land cell
    RegionDetail,
    /// One file per region, one row per regional mean
    RegionMeans,
    /// One file per variable, one row per regional mean
    VariableMeans,
}

impl Layout {
    /// Streaming layout for an output mode, `None` for table mode
    #[must_use]
    pub const fn for_mode(mode: OutputMode) -> Option<Self> {
        match mode {
            OutputMode::Table => None,
            OutputMode::RegionDetail => Some(Self::RegionDetail),
            OutputMode::RegionMeans => Some(Self::RegionMeans),
            OutputMode::VariableMeans => Some(Self::VariableMeans),
        }
    }

    #[must_use]
    pub const fn header(self) -> &'static str {
        match self {
            Self::RegionDetail => "year,month,variable_shortname,lat,long,value",
            Self::RegionMeans => "year,month,variable_shortname,value",
            Self::VariableMeans => "year,month,country_code,value",
        }
    }

    /// File name of the target for `key` (a region or a variable code)
    #[must_use]
    pub fn file_name(self, key: &str) -> String {
        match self {
            Self::RegionDetail => format!("era5_monthly_{}.csv", sanitize(key)),
            Self::RegionMeans => format!("region_means_{}.csv", sanitize(key)),
            Self::VariableMeans => {
                let name = key.replace('_', "").to_lowercase();
                format!("country_avg_{}.csv", sanitize(&name))
            }
        }
    }
}

fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Appends rows to one lazily opened file per target
///
/// A header is written only when the sink creates the file; rows for a target
/// that already existed on disk are appended without one. Open targets are
/// flushed and closed by [`OutputSink::finish`], and on drop otherwise.
pub struct AppendSink {
    dir: PathBuf,
    layout: Layout,
    precision: Option<usize>,
    /// Open writers by file name
    targets: HashMap<String, BufWriter<File>>,
    opened: usize,
}

impl AppendSink {
    /// Create a sink writing into `dir`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn new(dir: impl AsRef<Path>, layout: Layout) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            layout,
            precision: None,
            targets: HashMap::new(),
            opened: 0,
        })
    }

    #[must_use]
    pub fn with_precision(mut self, precision: Option<usize>) -> Self {
        self.precision = precision;
        self
    }

    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    /// Path of the file backing `key`
    #[must_use]
    pub fn target_path(&self, key: &str) -> PathBuf {
        self.dir.join(self.layout.file_name(key))
    }

    /// Number of targets currently open
    #[must_use]
    pub fn open_targets(&self) -> usize {
        self.targets.len()
    }

    /// Number of targets opened over the sink's lifetime
    #[must_use]
    pub const fn targets_opened(&self) -> usize {
        self.opened
    }

    fn target(&mut self, key: &str) -> Result<&mut BufWriter<File>> {
        // keyed by file name: distinct codes may sanitize to the same file
        let file_name = self.layout.file_name(key);
        match self.targets.entry(file_name) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = self.dir.join(entry.key());
                let is_new = !path.exists();
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                let mut writer = BufWriter::new(file);
                if is_new {
                    writeln!(writer, "{}", self.layout.header())?;
                }
                log::debug!("Opened output target {}", path.display());
                self.opened += 1;
                Ok(entry.insert(writer))
            }
        }
    }

    fn close_all(&mut self) -> Result<()> {
        let mut first_error = None;
        for (file_name, mut writer) in self.targets.drain() {
            if let Err(e) = writer.flush() {
                log::error!("Failed to flush output target '{file_name}': {e}");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), |e| Err(RegionAggError::IoError(e)))
    }
}

impl OutputSink for AppendSink {
    fn write_records(&mut self, records: &[AggregateRecord]) -> Result<()> {
        let precision = self.precision;
        match self.layout {
            Layout::RegionDetail => Ok(()),
            Layout::RegionMeans => {
                for record in records {
                    let writer = self.target(&record.region)?;
                    writeln!(
                        writer,
                        "{},{},{},{}",
                        record.year(),
                        record.month(),
                        record.variable,
                        format_value(record.value, precision)
                    )?;
                }
                Ok(())
            }
            Layout::VariableMeans => {
                for record in records {
                    let writer = self.target(record.variable.as_str())?;
                    writeln!(
                        writer,
                        "{},{},{},{}",
                        record.year(),
                        record.month(),
                        record.region,
                        format_value(record.value, precision)
                    )?;
                }
                Ok(())
            }
        }
    }

    fn wants_cells(&self) -> bool {
        self.layout == Layout::RegionDetail
    }

    fn write_cells(&mut self, cells: &[CellRecord]) -> Result<()> {
        if self.layout != Layout::RegionDetail {
            return Ok(());
        }
        let precision = self.precision;
        for cell in cells {
            let writer = self.target(&cell.region)?;
            writeln!(
                writer,
                "{},{},{},{},{},{}",
                cell.year(),
                cell.month(),
                cell.variable,
                cell.lat,
                cell.lon,
                format_value(cell.value, precision)
            )?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.close_all()
    }
}

impl Drop for AppendSink {
    fn drop(&mut self) {
        if !self.targets.is_empty() {
            // errors are already logged by close_all
            let _ = self.close_all();
        }
    }
}
