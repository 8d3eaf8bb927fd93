//! Gateway configuration module
//!
//! Configuration is read from environment variables using the `config` and
//! `dotenvy` crates. Variables carry the `FANOUT` prefix and nested values
//! are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use fanout_gateway::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Listening on {}{}", config.server.listen_addr, config.server.path);
//! ```

mod auth;
mod bus;
mod error;
mod server;

pub use auth::AuthConfig;
pub use bus::BusConfig;
pub use error::{ConfigError, ValidationError};
pub use server::{ServerConfig, MIN_WRITE_BUFFER_BYTES};

use serde::Deserialize;

/// Root gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Listener, limits and ops endpoints
    pub server: ServerConfig,

    /// Redis pub/sub bus
    pub bus: BusConfig,

    /// Optional in-process auth resolution
    #[serde(default)]
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// Loads `.env` if present, then reads `FANOUT__*` variables:
    ///
    /// - `FANOUT__SERVER__LISTEN_ADDR=0.0.0.0:8080` -> `server.listen_addr`
    /// - `FANOUT__BUS__CHANNEL=websocket` -> `bus.channel`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value
    /// cannot be parsed into its expected type.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("FANOUT")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.bus.validate()?;
        self.auth.validate()?;
        Ok(())
    }
}
