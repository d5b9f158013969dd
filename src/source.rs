//! Message stream abstraction
//!
//! The engine consumes raster messages only by iteration. A source answers two
//! questions: what the grid looks like (asked once, before streaming) and
//! which messages it holds, in timestep-contiguous order.

use crate::errors::{RegionAggError, Result};
use crate::message::{Grid, RasterMessage};

/// Iterator over the messages of a source; each item may fail on its own
pub type MessageIter<'a> = Box<dyn Iterator<Item = Result<RasterMessage>> + 'a>;

/// A sequential stream of raster messages sharing one grid
pub trait MessageSource {
    /// Coordinates of every grid cell
    ///
    /// # Errors
    ///
    /// A source without a usable grid definition fails here; the error is fatal.
    fn grid(&mut self) -> Result<Grid>;

    /// The messages, grouped so that each timestep is contiguous
    ///
    /// An `Err` item stands for one unreadable message; the stream continues.
    fn messages(&mut self) -> MessageIter<'_>;
}

/// Source backed by messages already held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    grid: Option<Grid>,
    messages: Vec<RasterMessage>,
}

impl MemorySource {
    #[must_use]
    pub fn new(grid: Grid, messages: Vec<RasterMessage>) -> Self {
        Self {
            grid: Some(grid),
            messages,
        }
    }

    /// A source that has messages but no grid definition
    #[must_use]
    pub fn without_grid(messages: Vec<RasterMessage>) -> Self {
        Self {
            grid: None,
            messages,
        }
    }

    pub fn push(&mut self, message: RasterMessage) {
        self.messages.push(message);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl MessageSource for MemorySource {
    fn grid(&mut self) -> Result<Grid> {
        self.grid.clone().ok_or_else(|| RegionAggError::GridUnavailable {
            message: "in-memory source has no grid".into(),
        })
    }

    fn messages(&mut self) -> MessageIter<'_> {
        Box::new(self.messages.iter().cloned().map(Ok))
    }
}
