//! Static verifier for testing.
//!
//! Implements the `AuthVerifier` port from a fixed token table, avoiding the
//! need for a real identity backend.
//!
//! # Example
//!
//! ```ignore
//! use fanout_gateway::adapters::auth::StaticVerifier;
//! use fanout_gateway::domain::foundation::{CorrelationToken, UserId};
//!
//! let verifier = StaticVerifier::new().with_user("valid-token", UserId::new(7));
//!
//! let verdict = verifier.verify(&CorrelationToken::from("valid-token")).await?;
//! assert_eq!(verdict, Verdict::Accepted(UserId::new(7)));
//! ```

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::domain::foundation::{CorrelationToken, UserId};
use crate::ports::{AuthVerifier, Verdict, VerifierError};

/// Verifier backed by an in-memory token table.
///
/// Tokens not in the table are rejected.
#[derive(Debug, Default)]
pub struct StaticVerifier {
    tokens: RwLock<HashMap<Vec<u8>, UserId>>,
    force_error: RwLock<Option<String>>,
}

impl StaticVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a token that proves `user_id`.
    pub fn with_user(self, token: impl AsRef<[u8]>, user_id: UserId) -> Self {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.as_ref().to_vec(), user_id);
        self
    }

    /// Makes every verification fail as if the backend were down.
    pub fn with_error(self, message: impl Into<String>) -> Self {
        *self
            .force_error
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(message.into());
        self
    }
}

#[async_trait]
impl AuthVerifier for StaticVerifier {
    async fn verify(&self, token: &CorrelationToken) -> Result<Verdict, VerifierError> {
        if let Some(message) = self
            .force_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(VerifierError::Request(message));
        }

        Ok(self
            .tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token.as_bytes())
            .copied()
            .map_or(Verdict::Rejected, Verdict::Accepted))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
