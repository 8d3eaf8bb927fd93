//! AuthVerifier port - Turns a credential token into a user identity.
//!
//! The gateway core never calls this directly; it only publishes
//! authentication requests. A verifier is plugged in by the optional
//! in-process resolver that answers those requests.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{CorrelationToken, UserId};

/// Outcome of verifying a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The token proves this user.
    Accepted(UserId),

    /// The token proves nobody.
    Rejected,
}

/// Errors talking to the identity backend.
#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("Identity backend request failed: {0}")]
    Request(String),

    #[error("Identity backend returned an unexpected response: {0}")]
    InvalidResponse(String),
}

/// Port for identity validation.
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    /// Verifies a token.
    async fn verify(&self, token: &CorrelationToken) -> Result<Verdict, VerifierError>;

    /// Verifier name for logging.
    fn name(&self) -> &'static str;
}
