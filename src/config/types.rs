//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::session::{
    SessionTimings, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PING_INTERVAL, DEFAULT_POLL_INTERVAL,
    DEFAULT_PONG_WAIT, DEFAULT_WRITE_WAIT,
};
use crate::tail::{ChangeDetector, TruncationPolicy};

/// Default port for the HTTP server.
pub const DEFAULT_PORT: u16 = 8080;

/// Process-wide configuration, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// File to follow.
    pub target_path: PathBuf,
    /// Change detector poll period, in milliseconds.
    pub poll_interval_ms: u64,
    /// Heartbeat period, in seconds. Must be less than `pong_wait_secs`.
    pub ping_interval_secs: u64,
    /// Read deadline extended by each pong, in seconds.
    pub pong_wait_secs: u64,
    /// Deadline for each outbound frame, in seconds.
    pub write_wait_secs: u64,
    /// Largest frame accepted from clients, in bytes.
    pub max_message_size: usize,
    /// Behaviour when the file shrinks below a client's offset.
    pub truncation: TruncationPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            target_path: PathBuf::new(),
            poll_interval_ms: u64::try_from(DEFAULT_POLL_INTERVAL.as_millis()).unwrap_or(1000),
            ping_interval_secs: DEFAULT_PING_INTERVAL.as_secs(),
            pong_wait_secs: DEFAULT_PONG_WAIT.as_secs(),
            write_wait_secs: DEFAULT_WRITE_WAIT.as_secs(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            truncation: TruncationPolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Create a configuration for `target_path` with default settings.
    #[must_use]
    pub fn new(target_path: impl Into<PathBuf>) -> Self {
        Self {
            target_path: target_path.into(),
            ..Self::default()
        }
    }

    /// Get the configured address as a string.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check the settings a server cannot start without.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("no target file given".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.ping_interval_secs == 0 || self.ping_interval_secs >= self.pong_wait_secs {
            return Err(ConfigError::Invalid(format!(
                "ping_interval_secs ({}) must be positive and less than pong_wait_secs ({})",
                self.ping_interval_secs, self.pong_wait_secs
            )));
        }
        if self.write_wait_secs == 0 {
            return Err(ConfigError::Invalid(
                "write_wait_secs must be positive".to_string(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::Invalid(
                "max_message_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Session timers derived from this configuration.
    #[must_use]
    pub fn timings(&self) -> SessionTimings {
        SessionTimings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            pong_wait: Duration::from_secs(self.pong_wait_secs),
            write_wait: Duration::from_secs(self.write_wait_secs),
            max_message_size: self.max_message_size,
        }
    }

    /// Change detector for the target file.
    #[must_use]
    pub fn detector(&self) -> ChangeDetector {
        ChangeDetector::new(&self.target_path).with_truncation(self.truncation)
    }
}
