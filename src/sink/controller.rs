//! Buffer sink controller
//!
//! Owns the session's sink and its single append target. The sink is bound to
//! the playback surface as soon as the controller exists so the platform can
//! open it; the target is created once the server announces the codec.

use crate::codec::{CodecList, CANDIDATE_CODECS};
use crate::error::{NegotiationError, SinkError};

use super::{AppendMode, AppendTarget, MediaSink, SharedSurface, SinkHandle};

pub struct BufferSinkController {
    sink: Box<dyn MediaSink>,
    handle: SinkHandle,
    surface: SharedSurface,
    target: Option<Box<dyn AppendTarget>>,
    codec: Option<String>,
    released: bool,
}

impl BufferSinkController {
    /// Take ownership of `sink` and bind it to `surface`
    pub fn new(sink: Box<dyn MediaSink>, surface: SharedSurface) -> Self {
        let handle = sink.handle();
        surface.lock().attach(handle);
        tracing::debug!("Sink {} bound to playback surface", handle.id());
        Self {
            sink,
            handle,
            surface,
            target: None,
            codec: None,
            released: false,
        }
    }

    pub fn handle(&self) -> SinkHandle {
        self.handle
    }

    /// Candidate codecs the sink reports it can decode
    pub fn supported_codecs(&self) -> CodecList {
        CodecList::supported_by(CANDIDATE_CODECS.iter().copied(), |mime| {
            self.sink.is_type_supported(mime)
        })
    }

    /// Negotiated codec descriptor, once a target exists
    pub fn codec(&self) -> Option<&str> {
        self.codec.as_deref()
    }

    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    /// Create the one append target for `descriptor`, in sequential mode.
    pub fn create_target(&mut self, descriptor: &str) -> Result<(), NegotiationError> {
        if self.released {
            return Err(NegotiationError::SinkRefused {
                codec: descriptor.to_string(),
                reason: SinkError::Closed.to_string(),
            });
        }
        if let Some(codec) = &self.codec {
            return Err(NegotiationError::SinkRefused {
                codec: descriptor.to_string(),
                reason: format!("target already created for {codec}"),
            });
        }

        let refused = |e: SinkError| NegotiationError::SinkRefused {
            codec: descriptor.to_string(),
            reason: e.to_string(),
        };
        let mut target = self.sink.add_target(descriptor).map_err(refused)?;
        target.set_mode(AppendMode::Sequence).map_err(refused)?;

        tracing::info!("Created append target for {}", descriptor);
        self.target = Some(target);
        self.codec = Some(descriptor.to_string());
        Ok(())
    }

    pub fn target_mut(&mut self) -> Option<&mut (dyn AppendTarget + 'static)> {
        self.target.as_deref_mut()
    }

    /// Target and sink together, for operations that touch both
    pub fn parts_mut(
        &mut self,
    ) -> Option<(&mut (dyn AppendTarget + 'static), &mut (dyn MediaSink + 'static))> {
        let target = self.target.as_deref_mut()?;
        Some((target, self.sink.as_mut()))
    }

    pub fn surface(&self) -> &SharedSurface {
        &self.surface
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Drop the target, close the sink and unbind it from the surface.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.target = None;
        self.sink.close();
        self.surface.lock().detach(self.handle);
        tracing::debug!("Sink {} released", self.handle.id());
    }
}

impl Drop for BufferSinkController {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::mock::{shared_surface, MockSink};

    #[test]
    fn test_binds_surface_on_creation() {
        let (sink, _) = MockSink::new(&["avc1.640029"]);
        let (surface, mock_surface) = shared_surface();
        let controller = BufferSinkController::new(Box::new(sink), surface);
        assert_eq!(mock_surface.lock().attached, Some(controller.handle()));
    }

    #[test]
    fn test_supported_codecs() {
        let (sink, _) = MockSink::new(&["avc1.640029", "mp4a.40.2"]);
        let (surface, _) = shared_surface();
        let controller = BufferSinkController::new(Box::new(sink), surface);
        assert_eq!(controller.supported_codecs().to_string(), "avc1.640029,mp4a.40.2");
    }

    #[test]
    fn test_single_target_in_sequence_mode() {
        let (sink, state) = MockSink::new(&["avc1.640029"]);
        let (surface, _) = shared_surface();
        let mut controller = BufferSinkController::new(Box::new(sink), surface);

        controller.create_target("video/mp4; codecs=\"avc1.640029\"").unwrap();
        assert!(controller.has_target());
        assert_eq!(state.lock().mode, Some(AppendMode::Sequence));

        assert!(controller.create_target("video/mp4; codecs=\"opus\"").is_err());
        assert_eq!(state.lock().targets_created.len(), 1);
    }

    #[test]
    fn test_refused_target() {
        let (sink, state) = MockSink::new(&[]);
        state.lock().refuse_targets = true;
        let (surface, _) = shared_surface();
        let mut controller = BufferSinkController::new(Box::new(sink), surface);

        let err = controller.create_target("vp09").unwrap_err();
        assert!(matches!(err, NegotiationError::SinkRefused { .. }));
        assert!(!controller.has_target());
        assert!(controller.codec().is_none());
    }

    #[test]
    fn test_release_is_idempotent() {
        let (sink, state) = MockSink::new(&["opus"]);
        let (surface, mock_surface) = shared_surface();
        let mut controller = BufferSinkController::new(Box::new(sink), surface);
        controller.create_target("opus").unwrap();

        controller.release();
        controller.release();
        drop(controller);

        assert_eq!(state.lock().closed, 1);
        assert_eq!(mock_surface.lock().attached, None);
        assert_eq!(mock_surface.lock().detached.len(), 1);
    }
}
