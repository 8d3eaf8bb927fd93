//! Logging and metrics setup.
//!
//! - [`logging`] - `tracing` subscriber (pretty or JSON, `EnvFilter` driven)
//! - [`metrics`] - Prometheus recorder and the gateway's metric names

pub mod logging;
pub mod metrics;

pub use self::logging::init_logging;
pub use self::metrics::init_metrics;

/// Errors that can occur while installing telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Log filter directive could not be parsed
    #[error("Invalid log filter '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },

    /// A global subscriber was already installed
    #[error("Logging already initialized: {0}")]
    LoggingInitialization(String),

    /// The Prometheus recorder could not be installed
    #[error("Metrics initialization failed: {0}")]
    MetricsInitialization(String),
}
