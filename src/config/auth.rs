//! Authentication backend configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Configuration of the optional in-process auth resolver.
///
/// When `backend_url` is unset, auth requests are left on the bus for an
/// external service to answer.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the member API
    #[serde(default)]
    pub backend_url: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl AuthConfig {
    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Whether the gateway answers auth requests itself.
    pub fn resolves_locally(&self) -> bool {
        self.backend_url.is_some()
    }

    /// Validate authentication configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(url) = &self.backend_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ValidationError::InvalidBackendUrl);
            }
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 60 {
            return Err(ValidationError::InvalidRequestTimeout);
        }
        Ok(())
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    5
}
