//! Live-edge playback synchronization

pub mod live_edge;

pub use live_edge::{catch_up_rate, LiveEdgeSynchronizer, PlaybackAdjustment, SyncPlan, SyncStats};
