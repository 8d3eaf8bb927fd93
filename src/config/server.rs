//! Server configuration

use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use super::error::ValidationError;

/// Smallest accepted bound on a client's queued output. Below this the
/// WebSocket write buffer itself would overflow the bound.
pub const MIN_WRITE_BUFFER_BYTES: usize = 128 * 1024;

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to
    pub listen_addr: SocketAddr,

    /// Request path that is upgraded to a WebSocket
    pub path: String,

    /// Address of the health/metrics HTTP server
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: SocketAddr,

    /// Rust log filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,

    /// Upper bound on a WebSocket handshake, in seconds
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Bytes that may queue for one slow client before it is dropped
    #[serde(default = "default_max_write_buffer")]
    pub max_write_buffer_bytes: usize,

    /// Readiness events collected per multiplexer wait
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Delay between the close notice and exit, in seconds
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,

    /// Raise the open-file soft limit to the hard limit at startup
    #[serde(default = "default_raise_fd_limit")]
    pub raise_fd_limit: bool,
}

impl ServerConfig {
    /// Creates a configuration with defaults for everything optional.
    pub fn new(listen_addr: SocketAddr, path: impl Into<String>) -> Self {
        Self {
            listen_addr,
            path: path.into(),
            metrics_addr: default_metrics_addr(),
            log_level: default_log_level(),
            json_logs: false,
            handshake_timeout_secs: default_handshake_timeout(),
            max_write_buffer_bytes: default_max_write_buffer(),
            event_capacity: default_event_capacity(),
            shutdown_grace_secs: default_shutdown_grace(),
            raise_fd_limit: default_raise_fd_limit(),
        }
    }

    /// Get handshake timeout as Duration
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// Get shutdown grace period as Duration
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Validate server configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.path.is_empty() {
            return Err(ValidationError::MissingRequired("SERVER__PATH"));
        }
        if !self.path.starts_with('/') {
            return Err(ValidationError::InvalidPath);
        }
        if self.handshake_timeout_secs == 0 || self.handshake_timeout_secs > 60 {
            return Err(ValidationError::InvalidHandshakeTimeout);
        }
        if self.max_write_buffer_bytes < MIN_WRITE_BUFFER_BYTES {
            return Err(ValidationError::WriteBufferTooSmall(MIN_WRITE_BUFFER_BYTES));
        }
        if self.event_capacity == 0 {
            return Err(ValidationError::InvalidEventCapacity);
        }
        Ok(())
    }
}

fn default_metrics_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9100))
}

fn default_log_level() -> String {
    "info,fanout_gateway=debug".to_string()
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_max_write_buffer() -> usize {
    1024 * 1024
}

fn default_event_capacity() -> usize {
    1024
}

fn default_shutdown_grace() -> u64 {
    3
}

fn default_raise_fd_limit() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServerConfig {
        ServerConfig::new("127.0.0.1:8080".parse().unwrap(), "/ws")
    }

    #[test]
    fn test_server_config_defaults() {
        let config = config();
        assert_eq!(config.metrics_addr.to_string(), "0.0.0.0:9100");
        assert_eq!(config.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(config.max_write_buffer_bytes, 1024 * 1024);
        assert_eq!(config.event_capacity, 1024);
        assert_eq!(config.shutdown_grace(), Duration::from_secs(3));
        assert!(config.raise_fd_limit);
        assert!(!config.json_logs);
    }

    #[test]
    fn test_valid_config() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_path_must_be_absolute() {
        let config = ServerConfig {
            path: "ws".to_string(),
            ..config()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidPath));
    }

    #[test]
    fn test_empty_path_is_missing() {
        let config = ServerConfig {
            path: String::new(),
            ..config()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingRequired("SERVER__PATH"))
        );
    }

    #[test]
    fn test_handshake_timeout_bounds() {
        for secs in [0, 61] {
            let config = ServerConfig {
                handshake_timeout_secs: secs,
                ..config()
            };
            assert_eq!(
                config.validate(),
                Err(ValidationError::InvalidHandshakeTimeout)
            );
        }
    }

    #[test]
    fn test_write_buffer_floor() {
        let config = ServerConfig {
            max_write_buffer_bytes: 1024,
            ..config()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::WriteBufferTooSmall(MIN_WRITE_BUFFER_BYTES))
        );
    }

    #[test]
    fn test_zero_event_capacity() {
        let config = ServerConfig {
            event_capacity: 0,
            ..config()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidEventCapacity));
    }
}
