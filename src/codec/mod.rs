//! Codec negotiation
//!
//! Works out which codecs the local sink can decode and announces them to the
//! server exactly once per session.

pub mod negotiator;
pub mod support;

pub use negotiator::CodecNegotiator;
pub use support::{mime_for, CodecList, CANDIDATE_CODECS};
