//! Message bus configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Redis pub/sub bus configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Redis connection URL
    pub url: String,

    /// Channel carrying every packet in both directions
    pub channel: String,

    /// Delay before the single connection retry, in seconds
    #[serde(default = "default_connect_retry")]
    pub connect_retry_secs: u64,
}

impl BusConfig {
    pub fn new(url: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            channel: channel.into(),
            connect_retry_secs: default_connect_retry(),
        }
    }

    /// Get retry delay as Duration
    pub fn connect_retry(&self) -> Duration {
        Duration::from_secs(self.connect_retry_secs)
    }

    /// Validate bus configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("BUS__URL"));
        }
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(ValidationError::InvalidRedisUrl);
        }
        if self.channel.is_empty() {
            return Err(ValidationError::MissingRequired("BUS__CHANNEL"));
        }
        Ok(())
    }
}

fn default_connect_retry() -> u64 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_config_defaults() {
        let config = BusConfig::new("redis://localhost:6379", "websocket");
        assert_eq!(config.connect_retry(), Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_missing_url() {
        let config = BusConfig::new("", "websocket");
        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingRequired("BUS__URL"))
        );
    }

    #[test]
    fn test_validation_invalid_url() {
        let config = BusConfig::new("http://localhost:6379", "websocket");
        assert_eq!(config.validate(), Err(ValidationError::InvalidRedisUrl));
    }

    #[test]
    fn test_validation_tls_url() {
        let config = BusConfig::new("rediss://cache.example.com:6380", "websocket");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_missing_channel() {
        let config = BusConfig::new("redis://localhost:6379", "");
        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingRequired("BUS__CHANNEL"))
        );
    }
}
