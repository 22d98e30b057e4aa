//! Live-edge synchronizer
//!
//! Runs after every append completion. Keeps at most `window` seconds buffered
//! behind the live edge, publishes that span as the seekable range, and steers
//! the playback cursor toward the edge:
//!
//! ```text
//!   earliest          start = end - window                end (live edge)
//!      |-------removed-------|===========retained===========|
//!                            ^ cursor behind here: seek to start
//!                             cursor in here: rate = max(end - cursor, min_rate)
//! ```

use crate::config::SyncConfig;
use crate::error::SinkError;
use crate::sink::{AppendTarget, BufferRange, MediaSink, PlaybackSurface, TimeRanges};

/// Proportional catch-up rule. Intentionally has no hysteresis.
pub fn catch_up_rate(end: f64, cursor: f64, min_rate: f64) -> f64 {
    let gap = end - cursor;
    if gap > min_rate {
        gap
    } else {
        min_rate
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackAdjustment {
    /// Hard jump forward; the cursor fell out of the retained window
    Seek(f64),
    /// New playback rate
    Rate(f64),
}

/// Actions for one synchronization pass
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPlan {
    /// Span to remove from the front of the buffer
    pub trim: Option<BufferRange>,
    /// Retained span, published as the seekable range after a trim
    pub retained: BufferRange,
    pub adjustment: PlaybackAdjustment,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SyncStats {
    pub trims: u64,
    pub deferred_trims: u64,
    pub catch_up_seeks: u64,
    pub last_rate: Option<f64>,
}

#[derive(Debug)]
pub struct LiveEdgeSynchronizer {
    window: f64,
    min_rate: f64,
    stats: SyncStats,
}

impl LiveEdgeSynchronizer {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            window: config.retention_window_secs,
            min_rate: config.min_playback_rate,
            stats: SyncStats::default(),
        }
    }

    pub fn window(&self) -> f64 {
        self.window
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Decide what to do for `buffered` and a playback `cursor`.
    /// Returns `None` when nothing is buffered yet.
    pub fn plan(&self, buffered: &TimeRanges, cursor: f64) -> Option<SyncPlan> {
        let end = buffered.live_edge()?;
        let earliest = buffered.earliest()?;
        let start = end - self.window;

        let trim = (earliest < start).then(|| BufferRange::new(earliest, start));
        let adjustment = if cursor < start {
            PlaybackAdjustment::Seek(start)
        } else {
            PlaybackAdjustment::Rate(catch_up_rate(end, cursor, self.min_rate))
        };

        Some(SyncPlan {
            trim,
            retained: BufferRange::new(start, end),
            adjustment,
        })
    }

    /// Apply one pass against the live sink and surface.
    ///
    /// The playback adjustment is always applied. A trim needs an idle target
    /// and is otherwise left for the next completion. A failed trim or
    /// seekable-range update is returned for the caller to classify.
    pub fn on_append_complete(
        &mut self,
        target: &mut dyn AppendTarget,
        sink: &mut dyn MediaSink,
        surface: &mut dyn PlaybackSurface,
    ) -> Result<Option<SyncPlan>, SinkError> {
        let Some(plan) = self.plan(&target.buffered(), surface.current_time()) else {
            return Ok(None);
        };

        let trimmed = match plan.trim {
            Some(_) if target.is_updating() => {
                self.stats.deferred_trims += 1;
                Ok(())
            }
            Some(range) => self.trim(target, sink, range, plan.retained),
            None => Ok(()),
        };

        match plan.adjustment {
            PlaybackAdjustment::Seek(position) => {
                tracing::debug!(
                    "Playback fell behind the window, seeking to {:.3}s",
                    position
                );
                self.stats.catch_up_seeks += 1;
                surface.seek(position);
            }
            PlaybackAdjustment::Rate(rate) => {
                self.stats.last_rate = Some(rate);
                surface.set_playback_rate(rate);
            }
        }

        trimmed.map(|()| Some(plan))
    }

    fn trim(
        &mut self,
        target: &mut dyn AppendTarget,
        sink: &mut dyn MediaSink,
        range: BufferRange,
        retained: BufferRange,
    ) -> Result<(), SinkError> {
        target.remove(range.start, range.end)?;
        sink.set_live_seekable_range(retained.start, retained.end)?;
        self.stats.trims += 1;
        tracing::trace!(
            "Trimmed [{:.3}, {:.3}), seekable [{:.3}, {:.3}]",
            range.start,
            range.end,
            retained.start,
            retained.end
        );
        Ok(())
    }
}
