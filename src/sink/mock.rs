//! Hand-driven sink and surface for unit tests

use parking_lot::Mutex;
use std::sync::Arc;

use super::*;

#[derive(Debug, Default)]
pub struct MockState {
    pub supported: Vec<String>,
    pub refuse_targets: bool,
    pub targets_created: Vec<String>,
    pub mode: Option<AppendMode>,
    pub updating: bool,
    pub fail_appends: bool,
    pub appends: Vec<Vec<u8>>,
    /// Appends attempted while another operation was in flight
    pub overlapping: usize,
    pub removes: Vec<(f64, f64)>,
    pub buffered: TimeRanges,
    pub seekable: Option<(f64, f64)>,
    pub closed: usize,
}

/// Sink whose state the test inspects and mutates directly
pub struct MockSink {
    handle: SinkHandle,
    pub state: Arc<Mutex<MockState>>,
}

impl MockSink {
    pub fn new(supported: &[&str]) -> (Self, Arc<Mutex<MockState>>) {
        let state = Arc::new(Mutex::new(MockState {
            supported: supported.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }));
        let sink = Self {
            handle: SinkHandle::next(),
            state: state.clone(),
        };
        (sink, state)
    }
}

impl MediaSink for MockSink {
    fn handle(&self) -> SinkHandle {
        self.handle
    }

    fn is_type_supported(&self, mime: &str) -> bool {
        self.state
            .lock()
            .supported
            .iter()
            .any(|codec| mime.contains(codec.as_str()))
    }

    fn add_target(&mut self, descriptor: &str) -> Result<Box<dyn AppendTarget>, SinkError> {
        let mut state = self.state.lock();
        if state.refuse_targets {
            return Err(SinkError::UnsupportedCodec(descriptor.to_string()));
        }
        state.targets_created.push(descriptor.to_string());
        Ok(Box::new(MockTarget {
            state: self.state.clone(),
        }))
    }

    fn set_live_seekable_range(&mut self, start: f64, end: f64) -> Result<(), SinkError> {
        self.state.lock().seekable = Some((start, end));
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().closed += 1;
    }
}

pub struct MockTarget {
    state: Arc<Mutex<MockState>>,
}

impl MockTarget {
    pub fn new(state: Arc<Mutex<MockState>>) -> Self {
        Self { state }
    }
}

impl AppendTarget for MockTarget {
    fn set_mode(&mut self, mode: AppendMode) -> Result<(), SinkError> {
        self.state.lock().mode = Some(mode);
        Ok(())
    }

    fn is_updating(&self) -> bool {
        self.state.lock().updating
    }

    fn append(&mut self, data: &[u8]) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if state.updating {
            state.overlapping += 1;
            return Err(SinkError::Busy);
        }
        if state.fail_appends {
            return Err(SinkError::AppendFailed("quota exceeded".into()));
        }
        state.appends.push(data.to_vec());
        state.updating = true;
        Ok(())
    }

    fn remove(&mut self, start: f64, end: f64) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if state.updating {
            return Err(SinkError::Busy);
        }
        state.removes.push((start, end));
        let remaining: Vec<BufferRange> = state
            .buffered
            .iter()
            .filter_map(|r| {
                if r.end <= end {
                    None
                } else {
                    Some(BufferRange::new(r.start.max(end), r.end))
                }
            })
            .collect();
        state.buffered = TimeRanges::new(remaining);
        state.updating = true;
        Ok(())
    }

    fn buffered(&self) -> TimeRanges {
        self.state.lock().buffered.clone()
    }
}

#[derive(Debug, Default)]
pub struct MockSurface {
    pub attached: Option<SinkHandle>,
    pub detached: Vec<SinkHandle>,
    pub position: f64,
    pub rate: Option<f64>,
    pub seeks: Vec<f64>,
}

impl PlaybackSurface for MockSurface {
    fn attach(&mut self, sink: SinkHandle) {
        self.attached = Some(sink);
    }

    fn detach(&mut self, sink: SinkHandle) {
        if self.attached == Some(sink) {
            self.attached = None;
        }
        self.detached.push(sink);
    }

    fn current_time(&self) -> f64 {
        self.position
    }

    fn seek(&mut self, position: f64) {
        self.position = position;
        self.seeks.push(position);
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.rate = Some(rate);
    }
}

/// Returns the surface both as the trait object and as the concrete type
pub fn shared_surface() -> (SharedSurface, Arc<Mutex<MockSurface>>) {
    let surface = Arc::new(Mutex::new(MockSurface::default()));
    let shared: SharedSurface = surface.clone();
    (shared, surface)
}
