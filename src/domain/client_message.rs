//! Messages exchanged with WebSocket clients.
//!
//! Clients only ever send one thing: a credential submission
//! `{"token": "<string>"}`. Anything else is ignored. Server-to-client
//! payloads are opaque bytes taken straight from the bus, except for the
//! close notice broadcast at shutdown.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::foundation::{ClientMessageError, CorrelationToken};

/// Payload broadcast to every connection when the gateway shuts down.
pub const CLOSE_NOTICE: &[u8] = b"{\"close\": 0}";

/// A credential submission from a client.
#[derive(Debug, Deserialize)]
pub struct AuthSubmission {
    token: SecretString,
}

impl AuthSubmission {
    /// Parses a raw client message as a credential submission.
    ///
    /// Any string is accepted, including an empty one; judging the token is
    /// the verifier's job.
    pub fn parse(bytes: &[u8]) -> Result<Self, ClientMessageError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Correlation key for this submission: the token itself.
    pub fn correlation_token(&self) -> CorrelationToken {
        CorrelationToken::from(self.token.expose_secret().as_str())
    }
}
