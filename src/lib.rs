//! # Live Edge Ingest
//!
//! Low-latency ingestion of a live fragmented-media stream with live-edge
//! playback synchronization.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DRIVER TASK (one per source)                     │
//! │                                                                          │
//! │  ┌──────────────────────┐        ┌──────────────────────────────────┐   │
//! │  │ Connection Manager   │───────►│ StreamSession (session)          │   │
//! │  │ (network::connection)│ text/  │                                  │   │
//! │  │  - socket open/close │ binary │  ┌────────────┐  ┌────────────┐  │   │
//! │  │  - reconnect timer   │        │  │   Codec    │  │  Overflow  │  │   │
//! │  │  - retry / teardown  │◄───────│  │ Negotiator │  │   Queue    │  │   │
//! │  └──────────┬───────────┘ codec  │  └────────────┘  └─────┬──────┘  │   │
//! │             │             frame  │                        │         │   │
//! │             │                    │  ┌─────────────────────▼──────┐  │   │
//! │   SinkEvent │ (opened,           │  │ Buffer Sink Controller     │  │   │
//! │   channel   │  update end)       │  │  - one append target       │  │   │
//! │             └───────────────────►│  └─────────────────────┬──────┘  │   │
//! │                                  │                        │         │   │
//! │                                  │  ┌─────────────────────▼──────┐  │   │
//! │                                  │  │ Live-Edge Synchronizer     │  │   │
//! │                                  │  │  - trim / seek / rate      │  │   │
//! │                                  │  └────────────────────────────┘  │   │
//! │                                  └──────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────────────┘
//!                │                                          │
//!                ▼                                          ▼
//!        MediaSink (platform)                     PlaybackSurface (platform)
//! ```
//!
//! All session events are dispatched from a single task, so segments reach the
//! sink in exactly the order they arrived on the socket.

pub mod buffer;
pub mod codec;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod session;
pub mod sink;
pub mod sync;
#[cfg(feature = "ui")]
pub mod ui;

pub use error::{Error, ErrorClass, Result};
pub use network::{ConnectionManager, SessionControl, SessionHandle, StatusSnapshot, StreamStatus};
pub use session::{SessionState, StreamSession};

/// Application-wide constants
pub mod constants {
    /// Delay before the single reconnect attempt after a socket close
    pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 15_000;

    /// Media retained behind the live edge, in seconds
    pub const DEFAULT_RETENTION_WINDOW_SECS: f64 = 5.0;

    /// Playback rate floor used once caught up with the live edge
    pub const MIN_PLAYBACK_RATE: f64 = 0.1;

    /// Overflow queue capacity in bytes
    pub const DEFAULT_OVERFLOW_CAPACITY: usize = 2 * 1024 * 1024;

    /// Default WebSocket path on the media server
    pub const DEFAULT_WS_PATH: &str = "/api/ws";

    /// Default media server address
    pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:1984";

    /// Interval between statistics snapshots
    pub const DEFAULT_STATS_INTERVAL_MS: u64 = 5_000;

    /// Default HTTP port for the control API
    pub const DEFAULT_HTTP_PORT: u16 = 8090;
}
