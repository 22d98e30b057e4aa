//! Overflow queue for segments that arrive while the sink is busy
//!
//! The sink rejects overlapping appends, but the socket keeps delivering. A
//! segment that cannot go straight to the sink is copied to the end of a
//! fixed-capacity buffer; the whole backlog is appended as one write when the
//! sink reports completion. Arrival order is preserved byte for byte.

use bytes::BytesMut;

use crate::error::SinkError;
use crate::sink::AppendTarget;

/// Fixed-capacity byte buffer with a write cursor at `len()`
#[derive(Debug)]
pub struct OverflowBuffer {
    storage: BytesMut,
    capacity: usize,
    overflow_count: usize,
}

impl OverflowBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: BytesMut::with_capacity(capacity),
            capacity,
            overflow_count: 0,
        }
    }

    /// Copy `segment` in at the cursor.
    /// Returns false, leaving the buffer untouched, if it does not fit.
    pub fn push(&mut self, segment: &[u8]) -> bool {
        if segment.len() > self.remaining() {
            self.overflow_count += 1;
            return false;
        }
        self.storage.extend_from_slice(segment);
        true
    }

    /// Queued bytes, oldest first
    pub fn as_slice(&self) -> &[u8] {
        &self.storage
    }

    /// Reset the cursor to zero. Capacity is kept.
    pub fn clear(&mut self) {
        self.storage.clear();
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.storage.len()
    }

    /// Segments refused for lack of space
    pub fn overflow_count(&self) -> usize {
        self.overflow_count
    }

    /// Fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        self.len() as f32 / self.capacity.max(1) as f32
    }
}

/// What happened to an incoming segment
#[derive(Debug)]
pub enum SegmentOutcome {
    /// Handed straight to the sink
    Appended,
    /// Copied into the overflow buffer
    Queued,
    /// Did not fit in the overflow buffer
    Dropped,
    /// The sink refused the direct append; the segment is gone
    Failed(SinkError),
}

/// What happened on an append-completion event
#[derive(Debug)]
pub enum FlushOutcome {
    /// Nothing queued
    Empty,
    /// Bytes queued but the sink is still busy
    Busy,
    /// This many queued bytes went to the sink as one append
    Flushed(usize),
    /// The sink refused the flush; the queued bytes are gone
    Failed(SinkError),
}

/// Counters for the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub direct_appends: u64,
    pub queued_segments: u64,
    pub flushes: u64,
    pub dropped_segments: u64,
    pub failed_appends: u64,
}

/// Serializes segment appends against the sink's busy state
#[derive(Debug)]
pub struct OverflowQueue {
    buffer: OverflowBuffer,
    stats: QueueStats,
}

impl OverflowQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: OverflowBuffer::with_capacity(capacity),
            stats: QueueStats::default(),
        }
    }

    /// Route one inbound segment. Never blocks.
    pub fn on_segment(&mut self, target: &mut dyn AppendTarget, segment: &[u8]) -> SegmentOutcome {
        if self.buffer.is_empty() && !target.is_updating() {
            return match target.append(segment) {
                Ok(()) => {
                    self.stats.direct_appends += 1;
                    SegmentOutcome::Appended
                }
                Err(e) => {
                    self.stats.failed_appends += 1;
                    SegmentOutcome::Failed(e)
                }
            };
        }

        if self.buffer.push(segment) {
            self.stats.queued_segments += 1;
            SegmentOutcome::Queued
        } else {
            self.stats.dropped_segments += 1;
            SegmentOutcome::Dropped
        }
    }

    /// Flush the backlog as a single append if the sink is idle.
    pub fn on_append_complete(&mut self, target: &mut dyn AppendTarget) -> FlushOutcome {
        if self.buffer.is_empty() {
            return FlushOutcome::Empty;
        }
        if target.is_updating() {
            return FlushOutcome::Busy;
        }

        let len = self.buffer.len();
        let result = target.append(self.buffer.as_slice());
        self.buffer.clear();
        match result {
            Ok(()) => {
                self.stats.flushes += 1;
                FlushOutcome::Flushed(len)
            }
            Err(e) => {
                self.stats.failed_appends += 1;
                FlushOutcome::Failed(e)
            }
        }
    }

    /// Bytes waiting for the sink
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn buffer(&self) -> &OverflowBuffer {
        &self.buffer
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
