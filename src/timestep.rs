//! Grouping of a message stream into per-timestep batches
//!
//! The input is expected to be timestep-contiguous already: all messages
//! sharing a [`TimestepKey`] arrive one after another. Nothing is re-sorted, so
//! at most one timestep's messages are held in memory at any time.

use crate::message::{RasterMessage, TimestepKey};

/// All messages of one timestep, in arrival order
#[derive(Debug, Clone)]
pub struct Batch {
    pub key: TimestepKey,
    pub messages: Vec<RasterMessage>,
}

impl Batch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Accumulates messages until the timestep key changes
#[derive(Debug, Default)]
pub struct TimestepBuffer {
    current: Option<TimestepKey>,
    buffer: Vec<RasterMessage>,
}

impl TimestepBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The key of the timestep being accumulated
    #[must_use]
    pub const fn current_key(&self) -> Option<TimestepKey> {
        self.current
    }

    /// Number of buffered messages
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Add a message, returning the previous timestep's batch if the key changed
    pub fn push(&mut self, message: RasterMessage) -> Option<Batch> {
        let key = message.key();
        let flushed = match self.current {
            Some(current) if current != key => self.take(current),
            _ => None,
        };
        self.current = Some(key);
        self.buffer.push(message);
        flushed
    }

    /// Flush whatever remains at end of stream
    ///
    /// Returns `None` when nothing is buffered, so a second call is a no-op.
    pub fn finish(&mut self) -> Option<Batch> {
        let key = self.current.take()?;
        self.take(key)
    }

    fn take(&mut self, key: TimestepKey) -> Option<Batch> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(Batch {
            key,
            messages: std::mem::take(&mut self.buffer),
        })
    }
}

/// Iterator adapter yielding one [`Batch`] per timestep, final flush included
pub struct Batches<I> {
    messages: I,
    buffer: TimestepBuffer,
    done: bool,
}

impl<I> Batches<I>
where
    I: Iterator<Item = RasterMessage>,
{
    pub fn new(messages: I) -> Self {
        Self {
            messages,
            buffer: TimestepBuffer::new(),
            done: false,
        }
    }
}

impl<I> Iterator for Batches<I>
where
    I: Iterator<Item = RasterMessage>,
{
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.done {
            return None;
        }
        for message in self.messages.by_ref() {
            if let Some(batch) = self.buffer.push(message) {
                return Some(batch);
            }
        }
        self.done = true;
        self.buffer.finish()
    }
}

/// Extension for grouping any message iterator into timestep batches
pub trait IntoBatches: Iterator<Item = RasterMessage> + Sized {
    fn batches(self) -> Batches<Self> {
        Batches::new(self)
    }
}

impl<I> IntoBatches for I where I: Iterator<Item = RasterMessage> {}
