//! Segment staging between the socket and the sink

pub mod overflow;

pub use overflow::{FlushOutcome, OverflowBuffer, OverflowQueue, QueueStats, SegmentOutcome};
