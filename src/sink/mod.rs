//! Platform buffered-media sink seams
//!
//! The engine never decodes media. It appends fragments into a platform sink
//! (think of a media-source object with one source buffer) and steers a
//! playback surface bound to that sink. These traits are the boundary.

pub mod controller;
pub mod simulated;

#[cfg(test)]
pub(crate) mod mock;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::SinkError;

pub use controller::BufferSinkController;
pub use simulated::{SimulatedSinkFactory, SimulatedSurface};

/// Contiguous span of buffered media, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferRange {
    pub start: f64,
    pub end: f64,
}

impl BufferRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Buffered ranges in ascending order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeRanges {
    ranges: Vec<BufferRange>,
}

impl TimeRanges {
    pub fn new(ranges: Vec<BufferRange>) -> Self {
        Self { ranges }
    }

    pub fn single(start: f64, end: f64) -> Self {
        Self::new(vec![BufferRange::new(start, end)])
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferRange> {
        self.ranges.iter()
    }

    /// Start of the earliest range
    pub fn earliest(&self) -> Option<f64> {
        self.ranges.first().map(|r| r.start)
    }

    /// End of the most recently buffered range
    pub fn live_edge(&self) -> Option<f64> {
        self.ranges.last().map(|r| r.end)
    }

    /// Distance from the earliest buffered point to the live edge
    pub fn span(&self) -> f64 {
        match (self.earliest(), self.live_edge()) {
            (Some(start), Some(end)) => end - start,
            _ => 0.0,
        }
    }
}

/// Append ordering for a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendMode {
    /// Timestamps inside each fragment decide placement
    Segments,
    /// Fragments are laid out back to back in append order
    Sequence,
}

/// Notifications from the platform sink, delivered to the session's driver
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    /// The sink is ready to accept a target
    Opened,
    /// An append or remove finished; the target is idle again
    UpdateEnd,
    /// The platform reported a failed append after the fact
    AppendError(String),
    /// The sink was torn down underneath the session
    Ended,
}

pub type SinkEventSender = mpsc::UnboundedSender<SinkEvent>;
pub type SinkEventReceiver = mpsc::UnboundedReceiver<SinkEvent>;

/// Opaque identity of a sink, used by the surface to bind to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkHandle(u64);

impl SinkHandle {
    /// Allocate a process-unique handle
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Incremental append target for one codec
pub trait AppendTarget: Send {
    fn set_mode(&mut self, mode: AppendMode) -> Result<(), SinkError>;

    /// True while an append or remove is in progress
    fn is_updating(&self) -> bool;

    /// Start appending `data`. Completion arrives as [`SinkEvent::UpdateEnd`].
    fn append(&mut self, data: &[u8]) -> Result<(), SinkError>;

    /// Start removing `[start, end)`. Completion arrives as [`SinkEvent::UpdateEnd`].
    fn remove(&mut self, start: f64, end: f64) -> Result<(), SinkError>;

    fn buffered(&self) -> TimeRanges;
}

/// Platform buffered-media sink
pub trait MediaSink: Send {
    fn handle(&self) -> SinkHandle;

    /// Probe a MIME type such as `video/mp4; codecs="avc1.640029"`
    fn is_type_supported(&self, mime: &str) -> bool;

    fn add_target(&mut self, descriptor: &str) -> Result<Box<dyn AppendTarget>, SinkError>;

    fn set_live_seekable_range(&mut self, start: f64, end: f64) -> Result<(), SinkError>;

    /// Release platform resources. Must tolerate repeated calls.
    fn close(&mut self);
}

/// Creates one sink per session
pub trait SinkFactory: Send + Sync {
    fn create(&self, events: SinkEventSender) -> Result<Box<dyn MediaSink>, SinkError>;
}

/// Rendering surface owned by the caller
pub trait PlaybackSurface: Send {
    fn attach(&mut self, sink: SinkHandle);

    fn detach(&mut self, sink: SinkHandle);

    /// Playback cursor in media seconds
    fn current_time(&self) -> f64;

    fn seek(&mut self, position: f64);

    fn set_playback_rate(&mut self, rate: f64);
}

/// Surface shared between the caller and successive sessions
pub type SharedSurface = Arc<Mutex<dyn PlaybackSurface>>;
