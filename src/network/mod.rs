//! Websocket transport, reconnect policy and the per-source driver

pub mod connection;
pub mod endpoint;
pub mod reconnect;

pub use connection::{ConnectionManager, SessionControl, SessionHandle, StatusSnapshot, StreamStatus};
pub use endpoint::stream_url;
pub use reconnect::ReconnectTimer;
