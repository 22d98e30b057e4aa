//! Control frames exchanged over the socket's text channel
//!
//! ```text
//! server -> client   {"type":"codec","value":"video/mp4; codecs=\"avc1.640029\""}
//! server -> client   {"type":"error","value":"stream not found"}
//! client -> server   {"type":"codec","value":"avc1.640029,mp4a.40.2,opus"}
//! ```
//!
//! Binary frames carry raw media fragments and have no envelope.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Tagged control message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Codec announcement. Inbound it names the stream's codec, outbound it
    /// lists what this client can decode.
    #[serde(alias = "mse")]
    Codec(String),
    /// Human-readable failure reported by the server
    Error(String),
}

impl ControlMessage {
    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Encode as a text frame
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_codec() {
        let msg = ControlMessage::parse(
            r#"{"type":"codec","value":"video/mp4; codecs=\"avc1.640029\""}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ControlMessage::Codec("video/mp4; codecs=\"avc1.640029\"".into())
        );
    }

    #[test]
    fn test_parse_mse_alias() {
        let msg = ControlMessage::parse(r#"{"type":"mse","value":"avc1.640029"}"#).unwrap();
        assert_eq!(msg, ControlMessage::Codec("avc1.640029".into()));
    }

    #[test]
    fn test_parse_error() {
        let msg = ControlMessage::parse(r#"{"type":"error","value":"stream offline"}"#).unwrap();
        assert_eq!(msg, ControlMessage::Error("stream offline".into()));
    }

    #[test]
    fn test_unknown_type_is_malformed() {
        assert!(ControlMessage::parse(r#"{"type":"ping","value":""}"#).is_err());
        assert!(ControlMessage::parse("not json").is_err());
    }

    #[test]
    fn test_encode_outbound() {
        let text = ControlMessage::Codec("avc1.640029,opus".into())
            .encode()
            .unwrap();
        assert_eq!(text, r#"{"type":"codec","value":"avc1.640029,opus"}"#);
    }
}
