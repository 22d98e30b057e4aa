//! Connection manager and per-source driver task
//!
//! [`ConnectionManager::open`] spawns one driver task per source. The driver
//! owns the websocket, the sink event channel and the current
//! [`StreamSession`], and multiplexes them with `tokio::select!` so every
//! session event runs to completion before the next one is looked at.
//!
//! A socket close leads to exactly one reconnect after the fixed delay. A
//! failure is published and waits for an explicit retry. Teardown, from the
//! handle or by dropping it, stops everything and cancels a pending reconnect.

use chrono::{DateTime, Utc};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ConnectionError, Error, Result};
use crate::session::{CloseReason, SessionState, SessionStats, StreamSession};
use crate::sink::{SharedSurface, SinkEvent, SinkEventReceiver, SinkFactory};

use super::endpoint::stream_url;
use super::reconnect::ReconnectTimer;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

/// Externally visible state of a source
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StreamStatus {
    Connecting,
    Negotiating,
    Streaming,
    Reconnecting { delay_ms: u64 },
    Failed { message: String },
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub source: String,
    pub session_id: Option<Uuid>,
    pub status: StreamStatus,
    pub codec: Option<String>,
    pub stats: SessionStats,
    /// Sessions started after the first
    pub reconnects: u64,
    pub updated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            session_id: None,
            status: StreamStatus::Connecting,
            codec: None,
            stats: SessionStats::default(),
            reconnects: 0,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionCommand {
    Retry,
    Teardown,
}

/// Cloneable control over a running source
#[derive(Debug, Clone)]
pub struct SessionControl {
    commands: mpsc::UnboundedSender<SessionCommand>,
    status: watch::Receiver<StatusSnapshot>,
}

impl SessionControl {
    /// Restart with a fresh session now, cancelling any pending reconnect
    pub fn retry(&self) {
        let _ = self.commands.send(SessionCommand::Retry);
    }

    /// Stop the source. Safe to call repeatedly or after the driver exited.
    pub fn teardown(&self) {
        let _ = self.commands.send(SessionCommand::Teardown);
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    /// Receiver that observes every status update
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }
}

/// Owning handle for a source. Dropping it tears the source down.
pub struct SessionHandle {
    control: SessionControl,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn control(&self) -> &SessionControl {
        &self.control
    }

    pub fn retry(&self) {
        self.control.retry();
    }

    pub fn teardown(&self) {
        self.control.teardown();
    }

    pub fn status(&self) -> StatusSnapshot {
        self.control.status()
    }

    /// Wait until the source stops, without stopping it.
    pub async fn closed(&mut self) {
        if let Some(task) = self.task.as_mut() {
            if let Err(e) = task.await {
                tracing::error!("Driver task failed: {}", e);
            }
            self.task = None;
        }
    }

    /// Tear down and wait for the driver task to finish.
    pub async fn shutdown(mut self) {
        self.control.teardown();
        self.closed().await;
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.control.teardown();
        }
    }
}

/// Opens sources against one media server
pub struct ConnectionManager {
    config: AppConfig,
    factory: Arc<dyn SinkFactory>,
    surface: SharedSurface,
}

impl ConnectionManager {
    pub fn new(config: AppConfig, factory: Arc<dyn SinkFactory>, surface: SharedSurface) -> Self {
        Self {
            config,
            factory,
            surface,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Spawn the driver for `source`. Must be called inside a Tokio runtime.
    pub fn open(&self, source: &str) -> Result<SessionHandle> {
        let url = stream_url(&self.config.stream.server_url, &self.config.stream.ws_path, source)?;
        tracing::info!("Opening {} at {}", source, url);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(StatusSnapshot::new(source));

        let driver = Driver {
            source: source.to_string(),
            url,
            config: self.config.clone(),
            factory: self.factory.clone(),
            surface: self.surface.clone(),
            commands: command_rx,
            status: status_tx,
            timer: ReconnectTimer::new(self.config.connection.reconnect_delay()),
            sessions: 0,
        };
        let task = tokio::spawn(driver.run());

        Ok(SessionHandle {
            control: SessionControl {
                commands: command_tx,
                status: status_rx,
            },
            task: Some(task),
        })
    }
}

/// How one session ended, from the driver's point of view
#[derive(Debug)]
enum Outcome {
    TornDown,
    Retry,
    Closed,
    Failed(String),
}

struct Driver {
    source: String,
    url: Url,
    config: AppConfig,
    factory: Arc<dyn SinkFactory>,
    surface: SharedSurface,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    status: watch::Sender<StatusSnapshot>,
    timer: ReconnectTimer,
    sessions: u64,
}

impl Driver {
    async fn run(mut self) {
        loop {
            let next = match self.run_session().await {
                Outcome::TornDown => None,
                Outcome::Retry => Some(()),
                Outcome::Closed => self.wait_reconnect().await,
                Outcome::Failed(message) => {
                    self.publish(|snapshot| snapshot.status = StreamStatus::Failed { message });
                    self.wait_retry().await
                }
            };
            if next.is_none() {
                break;
            }
        }

        self.timer.cancel();
        self.publish(|snapshot| snapshot.status = StreamStatus::Stopped);
        tracing::info!("Stopped {}", self.source);
    }

    /// Returns `None` when torn down while waiting
    async fn wait_reconnect(&mut self) -> Option<()> {
        self.timer.schedule();
        let delay_ms = self.timer.delay().as_millis() as u64;
        self.publish(|snapshot| snapshot.status = StreamStatus::Reconnecting { delay_ms });
        tracing::info!("Reconnecting in {} ms", delay_ms);

        tokio::select! {
            _ = self.timer.wait() => Some(()),
            command = self.commands.recv() => match command {
                Some(SessionCommand::Retry) => {
                    if let Some(left) = self.timer.remaining() {
                        tracing::info!("Retrying now, {} ms before the scheduled reconnect", left.as_millis());
                    }
                    self.timer.cancel();
                    Some(())
                }
                Some(SessionCommand::Teardown) | None => None,
            },
        }
    }

    /// Returns `None` when torn down while waiting
    async fn wait_retry(&mut self) -> Option<()> {
        match self.commands.recv().await {
            Some(SessionCommand::Retry) => Some(()),
            Some(SessionCommand::Teardown) | None => None,
        }
    }

    async fn run_session(&mut self) -> Outcome {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let sink = match self.factory.create(event_tx) {
            Ok(sink) => sink,
            Err(e) => return Outcome::Failed(Error::from(e).to_string()),
        };

        let mut session = StreamSession::new(
            self.source.clone(),
            sink,
            self.surface.clone(),
            &self.config,
        );
        session.begin();

        let reconnects = self.sessions;
        self.sessions += 1;
        let id = session.id();
        self.publish(|snapshot| {
            snapshot.session_id = Some(id);
            snapshot.status = StreamStatus::Connecting;
            snapshot.codec = None;
            snapshot.stats = SessionStats::default();
            snapshot.reconnects = reconnects;
        });

        let span = tracing::info_span!("session", source = %self.source, id = %id);
        let retry = self.drive(&mut session, event_rx).instrument(span).await;
        self.publish_session(&session);

        match session.close_reason() {
            _ if retry => Outcome::Retry,
            Some(CloseReason::Transient) => Outcome::Closed,
            Some(CloseReason::Failed) => {
                Outcome::Failed(session.failure().unwrap_or("session failed").to_string())
            }
            Some(CloseReason::Teardown) | None => Outcome::TornDown,
        }
    }

    /// Run `session` until it closes. Returns true if a retry was requested.
    async fn drive(&mut self, session: &mut StreamSession, mut events: SinkEventReceiver) -> bool {
        let connect = tokio_tungstenite::connect_async(self.url.as_str());
        let ws = tokio::select! {
            result = connect => match result {
                Ok((ws, _)) => ws,
                Err(e) => {
                    session.on_socket_error(ConnectionError::ConnectFailed(e.to_string()));
                    return false;
                }
            },
            command = self.commands.recv() => {
                session.teardown();
                return command == Some(SessionCommand::Retry);
            }
        };

        let (mut writer, mut reader) = ws.split();
        session.on_socket_open();
        self.publish_session(session);

        let mut stats_tick = tokio::time::interval(self.config.connection.stats_interval());
        stats_tick.tick().await;
        let mut events_open = true;
        let mut published = session.state();
        let mut retry = false;

        loop {
            flush_outbox(session, &mut writer).await;
            if session.is_closed() {
                break;
            }
            if session.state() != published {
                published = session.state();
                self.publish_session(session);
            }

            tokio::select! {
                frame = reader.next() => on_frame(session, frame),
                event = events.recv(), if events_open => match event {
                    Some(event) => session.on_sink_event(event),
                    None => {
                        events_open = false;
                        session.on_sink_event(SinkEvent::Ended);
                    }
                },
                command = self.commands.recv() => {
                    retry = command == Some(SessionCommand::Retry);
                    session.teardown();
                },
                _ = stats_tick.tick() => {
                    log_stats(session);
                    self.publish_session(session);
                }
            }
        }

        if session.close_reason() != Some(CloseReason::Transient) {
            if let Err(e) = writer.close().await {
                tracing::debug!("Socket close failed: {}", e);
            }
        }
        log_stats(session);
        retry
    }

    fn publish(&self, update: impl FnOnce(&mut StatusSnapshot)) {
        self.status.send_modify(|snapshot| {
            update(snapshot);
            snapshot.updated_at = Utc::now();
        });
    }

    fn publish_session(&self, session: &StreamSession) {
        let status = match session.state() {
            SessionState::Idle => StreamStatus::Connecting,
            SessionState::Negotiating => StreamStatus::Negotiating,
            SessionState::Streaming => StreamStatus::Streaming,
            // Closed sessions are reported by the outcome that follows
            SessionState::Closing | SessionState::Closed => {
                self.publish(|snapshot| snapshot.stats = session.stats());
                return;
            }
        };
        let codec = session.codec().map(str::to_string);
        let stats = session.stats();
        self.publish(|snapshot| {
            snapshot.status = status;
            snapshot.codec = codec;
            snapshot.stats = stats;
        });
    }
}

type Frame = Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>;

fn on_frame(session: &mut StreamSession, frame: Frame) {
    match frame {
        Some(Ok(Message::Text(text))) => session.on_text(&text),
        Some(Ok(Message::Binary(data))) => session.on_binary(&data),
        Some(Ok(Message::Close(frame))) => {
            if let Some(frame) = frame {
                tracing::debug!("Close frame: {} {}", frame.code, frame.reason);
            }
            session.on_socket_closed();
        }
        Some(Ok(_)) => {}
        Some(Err(e)) => session.on_socket_error(ConnectionError::Socket(e.to_string())),
        None => session.on_socket_closed(),
    }
}

async fn flush_outbox(session: &mut StreamSession, writer: &mut WsWriter) {
    while let Some(message) = session.take_outbound() {
        let text = match message.encode() {
            Ok(text) => text,
            Err(e) => {
                session.handle_error(e.into());
                return;
            }
        };
        if let Err(e) = writer.send(Message::Text(text)).await {
            session.on_socket_error(ConnectionError::SendFailed(e.to_string()));
            return;
        }
    }
}

fn log_stats(session: &StreamSession) {
    let stats = session.stats();
    tracing::info!(
        "{:?}: {} segments ({} bytes), {} queued, {} flushes, {} dropped, {} failed, {} trims, {} seeks, rate {}",
        session.state(),
        stats.segments_received,
        stats.bytes_received,
        stats.queued_segments,
        stats.flushes,
        stats.dropped_segments,
        stats.failed_appends,
        stats.trims,
        stats.catch_up_seeks,
        stats
            .playback_rate
            .map(|rate| format!("{rate:.2}"))
            .unwrap_or_else(|| "-".into())
    );
}
