//! Structured logging.
//!
//! `RUST_LOG` wins over the configured level when set, so operators can
//! raise verbosity without touching the gateway's own configuration.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use super::TelemetryError;

/// Installs the global `tracing` subscriber.
///
/// # Example
///
/// ```ignore
/// init_logging(&config.server.log_level, config.server.json_logs)?;
/// tracing::info!("Gateway starting");
/// ```
pub fn init_logging(level: &str, json: bool) -> Result<(), TelemetryError> {
    let filter = build_filter(level)?;

    let format = if json {
        fmt::layer()
            .with_target(true)
            .json()
            .flatten_event(true)
            .boxed()
    } else {
        fmt::layer().with_target(true).with_thread_names(true).boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInitialization(e.to_string()))
}

fn build_filter(level: &str) -> Result<EnvFilter, TelemetryError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|e| TelemetryError::InvalidFilter {
            directive: level.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_level_builds_a_filter() {
        assert!(build_filter("info,fanout_gateway=debug").is_ok());
    }

    #[test]
    fn plain_level_builds_a_filter() {
        assert!(build_filter("warn").is_ok());
    }
}
