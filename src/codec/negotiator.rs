//! Dual-readiness announcement gate
//!
//! The outbound codec announcement needs both an open socket and an open sink
//! (the sink is asked which codecs it accepts). The two open events race, so each handler
//! marks its flag and calls [`CodecNegotiator::try_announce`]; only the call
//! that finds both flags set, and nothing sent yet, produces the message.

use crate::protocol::ControlMessage;

use super::support::CodecList;

#[derive(Debug, Default)]
pub struct CodecNegotiator {
    socket_open: bool,
    sink_open: bool,
    announced: bool,
}

impl CodecNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_socket_open(&mut self) {
        self.socket_open = true;
    }

    pub fn mark_sink_open(&mut self) {
        self.sink_open = true;
    }

    pub fn is_ready(&self) -> bool {
        self.socket_open && self.sink_open
    }

    pub fn has_announced(&self) -> bool {
        self.announced
    }

    /// Returns the announcement the first time both sides are ready.
    ///
    /// `codecs` is only evaluated when the announcement is actually produced.
    pub fn try_announce<F>(&mut self, codecs: F) -> Option<ControlMessage>
    where
        F: FnOnce() -> CodecList,
    {
        if self.announced || !self.is_ready() {
            return None;
        }
        self.announced = true;
        Some(ControlMessage::Codec(codecs().to_string()))
    }
}
