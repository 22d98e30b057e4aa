//! Error types for the ingestion engine

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Negotiation error: {0}")]
    Negotiation(#[from] NegotiationError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Socket and transport errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Socket closed by peer")]
    Closed,
}

/// Codec negotiation errors
#[derive(Error, Debug)]
pub enum NegotiationError {
    #[error("No locally supported codecs")]
    NoSupportedCodecs,

    #[error("Server rejected stream: {0}")]
    Rejected(String),

    #[error("Sink refused codec {codec}: {reason}")]
    SinkRefused { codec: String, reason: String },
}

/// Buffered-media sink errors
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("Sink is busy with another operation")]
    Busy,

    #[error("Sink has been closed")]
    Closed,

    #[error("Append failed: {0}")]
    AppendFailed(String),

    #[error("Remove failed: {0}")]
    RemoveFailed(String),

    #[error("Platform error: {0}")]
    Platform(String),
}

/// Control-frame errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed control frame: {0}")]
    Malformed(String),

    #[error("Failed to encode control frame: {0}")]
    Encode(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// How a failure inside an event callback is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Socket closed without teardown. Handled by the single scheduled reconnect.
    Transient,
    /// No usable codec or the sink refused it. Surfaced, waits for retry.
    Negotiation,
    /// The sink rejected a write or trim. Discarded.
    Append,
    /// Anything else that ends the session. Surfaced, waits for retry.
    Fatal,
}

impl ErrorClass {
    /// Whether this class ends the session with a user-visible error.
    pub fn is_surfaced(self) -> bool {
        matches!(self, ErrorClass::Negotiation | ErrorClass::Fatal)
    }
}

impl Error {
    /// Classify this error at the point of occurrence.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Connection(ConnectionError::Closed) => ErrorClass::Transient,
            Error::Connection(_) => ErrorClass::Fatal,
            Error::Negotiation(_) => ErrorClass::Negotiation,
            Error::Sink(SinkError::UnsupportedCodec(_)) => ErrorClass::Negotiation,
            Error::Sink(
                SinkError::Busy | SinkError::AppendFailed(_) | SinkError::RemoveFailed(_),
            ) => ErrorClass::Append,
            Error::Sink(SinkError::Closed | SinkError::Platform(_)) => ErrorClass::Fatal,
            Error::Protocol(_) | Error::Config(_) | Error::Io(_) => ErrorClass::Fatal,
        }
    }
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            Error::from(ConnectionError::Closed).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            Error::from(ConnectionError::Socket("reset".into())).class(),
            ErrorClass::Fatal
        );
        assert_eq!(
            Error::from(SinkError::AppendFailed("quota".into())).class(),
            ErrorClass::Append
        );
        assert_eq!(
            Error::from(SinkError::UnsupportedCodec("vp9".into())).class(),
            ErrorClass::Negotiation
        );
        assert_eq!(Error::from(SinkError::Closed).class(), ErrorClass::Fatal);
        assert_eq!(
            Error::from(NegotiationError::NoSupportedCodecs).class(),
            ErrorClass::Negotiation
        );
    }

    #[test]
    fn test_surfaced_classes() {
        assert!(ErrorClass::Fatal.is_surfaced());
        assert!(ErrorClass::Negotiation.is_surfaced());
        assert!(!ErrorClass::Append.is_surfaced());
        assert!(!ErrorClass::Transient.is_surfaced());
    }
}
