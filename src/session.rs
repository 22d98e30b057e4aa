//! Stream session state machine
//!
//! A [`StreamSession`] is one ingestion attempt for one source. It performs no
//! I/O: the driver in [`crate::network::connection`] feeds it socket and sink
//! events one at a time and sends whatever it leaves in the outbox. Every
//! fallible step inside an event handler is classified and handled right
//! there, so nothing escapes to the caller.
//!
//! ```text
//!   Idle ──begin──► Negotiating ──codec──► Streaming
//!     │                  │                     │
//!     └──────────────────┴──── teardown / ─────┴──► Closing ──► Closed
//!                              fatal error / close
//! ```

use serde::Serialize;
use std::collections::VecDeque;
use uuid::Uuid;

use crate::buffer::{FlushOutcome, OverflowQueue, SegmentOutcome};
use crate::codec::CodecNegotiator;
use crate::config::AppConfig;
use crate::error::{ConnectionError, Error, ErrorClass, NegotiationError, SinkError};
use crate::protocol::ControlMessage;
use crate::sink::{BufferSinkController, MediaSink, SharedSurface, SinkEvent};
use crate::sync::LiveEdgeSynchronizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Negotiating,
    Streaming,
    Closing,
    Closed,
}

/// Why a session reached `Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Explicit teardown by the owner
    Teardown,
    /// Socket closed underneath the session; eligible for reconnect
    Transient,
    /// Negotiation or fatal failure; see [`StreamSession::failure`]
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SessionStats {
    pub bytes_received: u64,
    pub segments_received: u64,
    /// Segments that arrived before a target existed
    pub early_segments: u64,
    pub direct_appends: u64,
    pub queued_segments: u64,
    pub flushes: u64,
    pub dropped_segments: u64,
    pub failed_appends: u64,
    pub trims: u64,
    pub catch_up_seeks: u64,
    pub playback_rate: Option<f64>,
}

pub struct StreamSession {
    id: Uuid,
    source: String,
    state: SessionState,
    negotiator: CodecNegotiator,
    controller: BufferSinkController,
    queue: OverflowQueue,
    synchronizer: LiveEdgeSynchronizer,
    outbox: VecDeque<ControlMessage>,
    failure: Option<String>,
    close_reason: Option<CloseReason>,
    bytes_received: u64,
    segments_received: u64,
    early_segments: u64,
    sink_failures: u64,
}

impl StreamSession {
    /// Create an idle session owning `sink`, which is bound to `surface` immediately.
    pub fn new(
        source: impl Into<String>,
        sink: Box<dyn MediaSink>,
        surface: SharedSurface,
        config: &AppConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            state: SessionState::Idle,
            negotiator: CodecNegotiator::new(),
            controller: BufferSinkController::new(sink, surface),
            queue: OverflowQueue::new(config.buffer.overflow_capacity),
            synchronizer: LiveEdgeSynchronizer::new(&config.sync),
            outbox: VecDeque::new(),
            failure: None,
            close_reason: None,
            bytes_received: 0,
            segments_received: 0,
            early_segments: 0,
            sink_failures: 0,
        }
    }

    /// Start negotiating. The socket has been requested.
    pub fn begin(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::Negotiating;
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.close_reason.is_some()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// Message of the failure that closed the session
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn codec(&self) -> Option<&str> {
        self.controller.codec()
    }

    /// Bytes waiting in the overflow queue
    pub fn pending_bytes(&self) -> usize {
        self.queue.pending()
    }

    /// Next control frame to send
    pub fn take_outbound(&mut self) -> Option<ControlMessage> {
        self.outbox.pop_front()
    }

    pub fn stats(&self) -> SessionStats {
        let queue = self.queue.stats();
        let sync = self.synchronizer.stats();
        SessionStats {
            bytes_received: self.bytes_received,
            segments_received: self.segments_received,
            early_segments: self.early_segments,
            direct_appends: queue.direct_appends,
            queued_segments: queue.queued_segments,
            flushes: queue.flushes,
            dropped_segments: queue.dropped_segments,
            failed_appends: queue.failed_appends + self.sink_failures,
            trims: sync.trims,
            catch_up_seeks: sync.catch_up_seeks,
            playback_rate: sync.last_rate,
        }
    }

    pub fn on_socket_open(&mut self) {
        if self.is_closed() {
            return;
        }
        tracing::debug!("Socket open");
        self.negotiator.mark_socket_open();
        self.try_announce();
    }

    /// The socket closed without an explicit teardown
    pub fn on_socket_closed(&mut self) {
        self.handle_error(ConnectionError::Closed.into());
    }

    pub fn on_socket_error(&mut self, error: ConnectionError) {
        self.handle_error(error.into());
    }

    pub fn on_sink_event(&mut self, event: SinkEvent) {
        if self.is_closed() {
            return;
        }
        match event {
            SinkEvent::Opened => {
                tracing::debug!("Sink open");
                self.negotiator.mark_sink_open();
                self.try_announce();
            }
            SinkEvent::UpdateEnd => self.on_update_end(),
            SinkEvent::AppendError(reason) => {
                self.sink_failures += 1;
                self.handle_error(SinkError::AppendFailed(reason).into())
            }
            SinkEvent::Ended => self.handle_error(SinkError::Closed.into()),
        }
    }

    /// Handle a text frame
    pub fn on_text(&mut self, text: &str) {
        if self.is_closed() {
            return;
        }
        let message = match ControlMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Ignoring control frame: {}", e);
                return;
            }
        };

        match message {
            ControlMessage::Codec(descriptor) => self.on_codec(&descriptor),
            ControlMessage::Error(reason) => {
                self.handle_error(NegotiationError::Rejected(reason).into())
            }
        }
    }

    /// Handle a binary frame. Appends or enqueues synchronously.
    pub fn on_binary(&mut self, segment: &[u8]) {
        if self.is_closed() {
            return;
        }
        self.bytes_received += segment.len() as u64;
        self.segments_received += 1;

        let Some(target) = self.controller.target_mut() else {
            self.early_segments += 1;
            tracing::trace!("Dropping {} byte segment received before codec", segment.len());
            return;
        };

        match self.queue.on_segment(target, segment) {
            SegmentOutcome::Appended | SegmentOutcome::Queued => {}
            SegmentOutcome::Dropped => tracing::warn!(
                "Overflow queue {:.0}% full ({} of {} bytes), dropped {} byte segment",
                self.queue.buffer().fill_level() * 100.0,
                self.queue.pending(),
                self.queue.capacity(),
                segment.len()
            ),
            SegmentOutcome::Failed(e) => self.handle_error(e.into()),
        }
    }

    /// Explicit teardown. Safe to call any number of times.
    pub fn teardown(&mut self) {
        self.close(CloseReason::Teardown);
    }

    fn on_codec(&mut self, descriptor: &str) {
        if self.controller.has_target() {
            tracing::warn!("Ignoring repeated codec announcement: {}", descriptor);
            return;
        }
        match self.controller.create_target(descriptor) {
            Ok(()) => {
                tracing::info!("Streaming {} as {}", self.source, descriptor);
                self.state = SessionState::Streaming;
            }
            Err(e) => self.handle_error(e.into()),
        }
    }

    fn on_update_end(&mut self) {
        let surface = self.controller.surface().clone();
        let Some((target, sink)) = self.controller.parts_mut() else {
            return;
        };
        if target.is_updating() {
            return;
        }

        let mut errors: Vec<SinkError> = Vec::new();
        match self.queue.on_append_complete(target) {
            FlushOutcome::Flushed(len) => tracing::trace!("Flushed {} queued bytes", len),
            FlushOutcome::Failed(e) => errors.push(e),
            FlushOutcome::Empty | FlushOutcome::Busy => {}
        }

        let mut surface = surface.lock();
        match self.synchronizer.on_append_complete(target, sink, &mut *surface) {
            Ok(Some(plan)) => tracing::trace!("Synchronized: {:?}", plan),
            Ok(None) => {}
            Err(e) => {
                self.sink_failures += 1;
                errors.push(e);
            }
        }
        drop(surface);

        for e in errors {
            self.handle_error(e.into());
        }
    }

    fn try_announce(&mut self) {
        let controller = &self.controller;
        let Some(message) = self.negotiator.try_announce(|| controller.supported_codecs()) else {
            return;
        };
        if matches!(&message, ControlMessage::Codec(list) if list.is_empty()) {
            self.handle_error(NegotiationError::NoSupportedCodecs.into());
            return;
        }
        tracing::debug!("Announcing codecs: {:?}", message);
        self.outbox.push_back(message);
    }

    /// Classify `error` and act on it.
    pub fn handle_error(&mut self, error: Error) {
        if self.is_closed() {
            return;
        }
        let class = error.class();
        if class.is_surfaced() {
            tracing::error!("Session failed: {}", error);
            self.failure = Some(error.to_string());
            self.close(CloseReason::Failed);
        } else if class == ErrorClass::Transient {
            tracing::info!("Socket closed: {}", error);
            self.close(CloseReason::Transient);
        } else {
            tracing::debug!("Discarding sink failure: {}", error);
        }
    }

    fn close(&mut self, reason: CloseReason) {
        if self.is_closed() {
            return;
        }
        self.close_reason = Some(reason);
        self.state = SessionState::Closing;
        self.controller.release();
        self.queue.clear();
        self.outbox.clear();
        self.state = SessionState::Closed;
        tracing::debug!("Session closed ({:?})", reason);
    }
}
