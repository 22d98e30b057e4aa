//! Simulated platform sink and surface
//!
//! Stands in for a real buffered-media platform in the viewer binary and in
//! integration tests. Media time is estimated from a nominal bitrate; appends
//! and removals complete asynchronously after a fixed latency, and overlapping
//! operations are rejected the way a real source buffer rejects them.
//!
//! Completions are scheduled with `tokio::spawn`, so targets must be used from
//! inside a Tokio runtime.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::SinkConfig;
use crate::error::SinkError;

use super::*;

/// Creates a [`SimulatedSink`] per session
#[derive(Debug, Clone)]
pub struct SimulatedSinkFactory {
    config: SinkConfig,
}

impl SimulatedSinkFactory {
    pub fn new(config: SinkConfig) -> Self {
        Self { config }
    }
}

impl SinkFactory for SimulatedSinkFactory {
    fn create(&self, events: SinkEventSender) -> Result<Box<dyn MediaSink>, SinkError> {
        let sink = SimulatedSink::open(&self.config, events)?;
        Ok(Box::new(sink))
    }
}

#[derive(Default)]
struct SinkState {
    updating: bool,
    buffered: Option<BufferRange>,
    seekable: Option<(f64, f64)>,
    closed: bool,
    mode: Option<AppendMode>,
    bytes_appended: u64,
    recorder: Option<BufWriter<File>>,
}

pub struct SimulatedSink {
    handle: SinkHandle,
    state: Arc<Mutex<SinkState>>,
    events: SinkEventSender,
    supported: Vec<String>,
    bitrate: u64,
    latency: Duration,
}

impl SimulatedSink {
    /// Open the sink. `Opened` is reported through `events` right away.
    pub fn open(config: &SinkConfig, events: SinkEventSender) -> Result<Self, SinkError> {
        let recorder = match &config.record_path {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| {
                        SinkError::Platform(format!("cannot open {}: {}", path.display(), e))
                    })?;
                tracing::info!("Recording appended media to {}", path.display());
                Some(BufWriter::new(file))
            }
            None => None,
        };

        let sink = Self {
            handle: SinkHandle::next(),
            state: Arc::new(Mutex::new(SinkState {
                recorder,
                ..Default::default()
            })),
            events,
            supported: config.codecs.clone(),
            bitrate: config.nominal_bitrate.max(1),
            latency: Duration::from_millis(config.append_latency_ms),
        };
        let _ = sink.events.send(SinkEvent::Opened);
        Ok(sink)
    }

    /// Bytes accepted so far
    pub fn bytes_appended(&self) -> u64 {
        self.state.lock().bytes_appended
    }

    pub fn seekable(&self) -> Option<(f64, f64)> {
        self.state.lock().seekable
    }

    /// Mode last set on the target
    pub fn mode(&self) -> Option<AppendMode> {
        self.state.lock().mode
    }

    fn supports_all(&self, codecs: &str) -> bool {
        let mut any = false;
        for codec in codecs.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            if !self.supported.iter().any(|s| s == codec) {
                return false;
            }
            any = true;
        }
        any
    }
}

/// Codec list out of `video/mp4; codecs="a,b"`, or the input as-is
fn codecs_of(descriptor: &str) -> &str {
    match descriptor.find("codecs=") {
        Some(idx) => descriptor[idx + "codecs=".len()..].trim_matches(|c| c == '"' || c == ' '),
        None => descriptor,
    }
}

impl MediaSink for SimulatedSink {
    fn handle(&self) -> SinkHandle {
        self.handle
    }

    fn is_type_supported(&self, mime: &str) -> bool {
        self.supports_all(codecs_of(mime))
    }

    fn add_target(&mut self, descriptor: &str) -> Result<Box<dyn AppendTarget>, SinkError> {
        if self.state.lock().closed {
            return Err(SinkError::Closed);
        }
        if !self.supports_all(codecs_of(descriptor)) {
            return Err(SinkError::UnsupportedCodec(descriptor.to_string()));
        }
        Ok(Box::new(SimulatedTarget {
            state: self.state.clone(),
            events: self.events.clone(),
            bitrate: self.bitrate,
            latency: self.latency,
        }))
    }

    fn set_live_seekable_range(&mut self, start: f64, end: f64) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SinkError::Closed);
        }
        state.seekable = Some((start, end));
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.updating = false;
        if let Some(mut recorder) = state.recorder.take() {
            if let Err(e) = recorder.flush() {
                tracing::warn!("Failed to flush recording: {}", e);
            }
        }
    }
}

struct SimulatedTarget {
    state: Arc<Mutex<SinkState>>,
    events: SinkEventSender,
    bitrate: u64,
    latency: Duration,
}

impl SimulatedTarget {
    fn begin_update(&self, state: &mut SinkState) {
        state.updating = true;
        let shared = self.state.clone();
        let events = self.events.clone();
        let latency = self.latency;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            {
                let mut state = shared.lock();
                if state.closed {
                    return;
                }
                state.updating = false;
            }
            let _ = events.send(SinkEvent::UpdateEnd);
        });
    }

    fn check_idle(state: &SinkState) -> Result<(), SinkError> {
        if state.closed {
            return Err(SinkError::Closed);
        }
        if state.updating {
            return Err(SinkError::Busy);
        }
        Ok(())
    }
}

impl AppendTarget for SimulatedTarget {
    fn set_mode(&mut self, mode: AppendMode) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        Self::check_idle(&state)?;
        state.mode = Some(mode);
        Ok(())
    }

    fn is_updating(&self) -> bool {
        self.state.lock().updating
    }

    fn append(&mut self, data: &[u8]) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        Self::check_idle(&state)?;

        if let Some(recorder) = state.recorder.as_mut() {
            recorder
                .write_all(data)
                .map_err(|e| SinkError::AppendFailed(e.to_string()))?;
        }

        // No timestamps are parsed, so both modes lay fragments end to end.
        let duration = data.len() as f64 * 8.0 / self.bitrate as f64;
        state.buffered = Some(match state.buffered {
            Some(range) => BufferRange::new(range.start, range.end + duration),
            None => BufferRange::new(0.0, duration),
        });
        state.bytes_appended += data.len() as u64;

        self.begin_update(&mut state);
        Ok(())
    }

    fn remove(&mut self, start: f64, end: f64) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        Self::check_idle(&state)?;
        if !(start < end) {
            return Err(SinkError::RemoveFailed(format!("empty range [{start}, {end})")));
        }

        state.buffered = match state.buffered {
            Some(range) if start <= range.start && end > range.start => {
                if end >= range.end {
                    None
                } else {
                    Some(BufferRange::new(end, range.end))
                }
            }
            other => other,
        };

        self.begin_update(&mut state);
        Ok(())
    }

    fn buffered(&self) -> TimeRanges {
        match self.state.lock().buffered {
            Some(range) => TimeRanges::new(vec![range]),
            None => TimeRanges::default(),
        }
    }
}

/// Surface whose cursor advances with wall-clock time scaled by the rate
#[derive(Debug)]
pub struct SimulatedSurface {
    attached: Option<SinkHandle>,
    anchor: Instant,
    anchor_position: f64,
    rate: f64,
    seeks: u64,
}

impl Default for SimulatedSurface {
    fn default() -> Self {
        Self {
            attached: None,
            anchor: Instant::now(),
            anchor_position: 0.0,
            rate: 1.0,
            seeks: 0,
        }
    }
}

impl SimulatedSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap for sharing with a [`ConnectionManager`](crate::ConnectionManager)
    pub fn shared() -> (SharedSurface, Arc<Mutex<SimulatedSurface>>) {
        let surface = Arc::new(Mutex::new(Self::new()));
        let shared: SharedSurface = surface.clone();
        (shared, surface)
    }

    pub fn attached(&self) -> Option<SinkHandle> {
        self.attached
    }

    pub fn playback_rate(&self) -> f64 {
        self.rate
    }

    pub fn seek_count(&self) -> u64 {
        self.seeks
    }

    fn reanchor(&mut self, position: f64) {
        self.anchor = Instant::now();
        self.anchor_position = position;
    }
}

impl PlaybackSurface for SimulatedSurface {
    fn attach(&mut self, sink: SinkHandle) {
        self.attached = Some(sink);
        self.rate = 1.0;
        self.reanchor(0.0);
    }

    fn detach(&mut self, sink: SinkHandle) {
        if self.attached == Some(sink) {
            self.attached = None;
        }
    }

    fn current_time(&self) -> f64 {
        self.anchor_position + self.anchor.elapsed().as_secs_f64() * self.rate
    }

    fn seek(&mut self, position: f64) {
        self.seeks += 1;
        self.reanchor(position);
    }

    fn set_playback_rate(&mut self, rate: f64) {
        let position = self.current_time();
        self.reanchor(position);
        self.rate = rate;
    }
}
