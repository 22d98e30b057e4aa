//! Application configuration
//!
//! Loaded from TOML. Every field has a default so a partial file, or no file
//! at all, yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::codec::CANDIDATE_CODECS;
use crate::constants::*;
use crate::error::ConfigError;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub connection: ConnectionConfig,
    pub buffer: BufferConfig,
    pub sync: SyncConfig,
    pub sink: SinkConfig,
    pub ui: UiConfig,
    pub logging: LoggingConfig,
}

/// Which stream to ingest and where it lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Base URL of the media server (`ws`, `wss`, `http` or `https`)
    pub server_url: String,
    /// WebSocket path on the server
    pub ws_path: String,
    /// Source name, sent as the `src` query parameter
    pub source: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            source: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub reconnect_delay_ms: u64,
    pub stats_interval_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            stats_interval_ms: DEFAULT_STATS_INTERVAL_MS,
        }
    }
}

impl ConnectionConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Overflow queue capacity in bytes, fixed for the life of a session
    pub overflow_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            overflow_capacity: DEFAULT_OVERFLOW_CAPACITY,
        }
    }
}

/// Live-edge synchronizer tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub retention_window_secs: f64,
    pub min_playback_rate: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retention_window_secs: DEFAULT_RETENTION_WINDOW_SECS,
            min_playback_rate: MIN_PLAYBACK_RATE,
        }
    }
}

/// Simulated sink used by the viewer binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Codecs the simulated platform claims to decode
    pub codecs: Vec<String>,
    /// Nominal stream bitrate used to estimate buffered media time
    pub nominal_bitrate: u64,
    /// Simulated time for an append or remove to complete
    pub append_latency_ms: u64,
    /// Write every appended byte to this file
    pub record_path: Option<PathBuf>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            codecs: CANDIDATE_CODECS.iter().map(|c| c.to_string()).collect(),
            nominal_bitrate: 4_000_000,
            append_latency_ms: 5,
            record_path: None,
        }
    }
}

/// HTTP control API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub http_port: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1".to_string(),
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback filter when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Load from `path` if given, else from the platform config file if it
    /// exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::info!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Platform config file location
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "live-edge-ingest")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            field: "config",
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.reconnect_delay_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "connection.reconnect_delay_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.connection.stats_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "connection.stats_interval_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.buffer.overflow_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "buffer.overflow_capacity",
                reason: "must be greater than zero".into(),
            });
        }
        if !(self.sync.retention_window_secs > 0.0) {
            return Err(ConfigError::Invalid {
                field: "sync.retention_window_secs",
                reason: format!("{} is not a positive duration", self.sync.retention_window_secs),
            });
        }
        if !(self.sync.min_playback_rate > 0.0) {
            return Err(ConfigError::Invalid {
                field: "sync.min_playback_rate",
                reason: format!("{} is not a positive rate", self.sync.min_playback_rate),
            });
        }
        if self.sink.nominal_bitrate == 0 {
            return Err(ConfigError::Invalid {
                field: "sink.nominal_bitrate",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}
