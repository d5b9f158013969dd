//! Output record types

use crate::message::{TimestepKey, VariableCode};
use chrono::{DateTime, Datelike, Utc};

/// Mean of one variable over the valid cells of one region at one timestep
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRecord {
    pub valid_time: DateTime<Utc>,
    pub forecast_step: i64,
    pub region: String,
    pub variable: VariableCode,
    /// Unweighted arithmetic mean of the contributing cells
    pub value: f64,
    /// Number of valid cells that contributed to `value`
    pub cells: usize,
}

impl AggregateRecord {
    #[must_use]
    pub const fn key(&self) -> TimestepKey {
        TimestepKey::new(self.valid_time, self.forecast_step)
    }

    #[must_use]
    pub fn year(&self) -> i32 {
        self.valid_time.year()
    }

    #[must_use]
    pub fn month(&self) -> u32 {
        self.valid_time.month()
    }
}

/// One valid land cell, for detail-preserving output
#[derive(Debug, Clone, PartialEq)]
pub struct CellRecord {
    pub valid_time: DateTime<Utc>,
    pub region: String,
    pub variable: VariableCode,
    pub lat: f64,
    pub lon: f64,
    pub value: f64,
}

impl CellRecord {
    #[must_use]
    pub fn year(&self) -> i32 {
        self.valid_time.year()
    }

    #[must_use]
    pub fn month(&self) -> u32 {
        self.valid_time.month()
    }
}
