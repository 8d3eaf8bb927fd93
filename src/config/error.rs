//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Upgrade path must start with '/'")]
    InvalidPath,

    #[error("Invalid handshake timeout (must be 1-60 seconds)")]
    InvalidHandshakeTimeout,

    #[error("Write buffer bound must be at least {0} bytes")]
    WriteBufferTooSmall(usize),

    #[error("Event capacity must be greater than zero")]
    InvalidEventCapacity,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Invalid backend URL format")]
    InvalidBackendUrl,

    #[error("Invalid backend request timeout (must be 1-60 seconds)")]
    InvalidRequestTimeout,
}
