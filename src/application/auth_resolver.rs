//! AuthResolver - Answers authentication requests in-process.
//!
//! Enabled only when an identity backend is configured. Each request is
//! verified and the verdict is published back onto the bus, where the
//! dispatcher picks it up like any externally produced verdict.

use std::sync::Arc;

use crate::domain::foundation::CorrelationToken;
use crate::domain::Packet;
use crate::ports::{AuthVerifier, BusError, BusPublisher, Verdict};
use crate::telemetry::metrics as gauges;

/// Turns `0x80` requests into `0x02`/`0x03` verdicts.
pub struct AuthResolver {
    verifier: Arc<dyn AuthVerifier>,
    publisher: Arc<dyn BusPublisher>,
}

impl AuthResolver {
    pub fn new(verifier: Arc<dyn AuthVerifier>, publisher: Arc<dyn BusPublisher>) -> Self {
        Self {
            verifier,
            publisher,
        }
    }

    /// Verifies `token` and publishes the verdict.
    ///
    /// A verifier error is published as a rejection so the client is not
    /// left waiting on a request nobody will answer.
    pub async fn resolve(&self, token: CorrelationToken) -> Result<Verdict, BusError> {
        let verdict = match self.verifier.verify(&token).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(verifier = self.verifier.name(), "Token verification failed: {}", e);
                Verdict::Rejected
            }
        };

        let packet = match verdict {
            Verdict::Accepted(user_id) => Packet::AuthSuccess { user_id, token },
            Verdict::Rejected => Packet::AuthFailure { token },
        };
        self.publisher.publish(packet.encode())?;

        let outcome = match verdict {
            Verdict::Accepted(_) => "verified",
            Verdict::Rejected => "refused",
        };
        metrics::counter!(gauges::AUTH_VERIFICATIONS, "outcome" => outcome).increment(1);

        Ok(verdict)
    }
}
