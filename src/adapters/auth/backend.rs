//! HTTP identity backend verifier.
//!
//! Resolves a client token by asking the application backend who it
//! belongs to:
//!
//! ```text
//! GET {backend_url}member/self/
//! Authorization: Token <token>
//!
//! 200 {"s": true, "d": {"id": 7, ...}, "m": ""}
//! ```
//!
//! A response without `d.id` means the token proves nobody.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::domain::foundation::{CorrelationToken, UserId};
use crate::ports::{AuthVerifier, Verdict, VerifierError};

/// Envelope returned by the backend's member endpoint.
#[derive(Debug, Deserialize)]
struct MemberResponse {
    #[serde(default)]
    s: bool,
    #[serde(default)]
    d: Option<serde_json::Value>,
    #[serde(default)]
    m: String,
}

/// Verifies tokens against the backend's `member/self/` endpoint.
pub struct BackendVerifier {
    endpoint: String,
    http_client: reqwest::Client,
}

impl BackendVerifier {
    /// Creates a verifier for the backend rooted at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, VerifierError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerifierError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: member_endpoint(base_url),
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AuthVerifier for BackendVerifier {
    async fn verify(&self, token: &CorrelationToken) -> Result<Verdict, VerifierError> {
        let Some(authorization) = authorization_header(token) else {
            tracing::debug!("Token is not a valid header value");
            return Ok(Verdict::Rejected);
        };

        let response = self
            .http_client
            .get(&self.endpoint)
            .header(AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| VerifierError::Request(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Ok(Verdict::Rejected);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| VerifierError::Request(e.to_string()))?;
        parse_member_response(&body)
    }

    fn name(&self) -> &'static str {
        "backend"
    }
}

fn member_endpoint(base_url: &str) -> String {
    format!("{}/member/self/", base_url.trim_end_matches('/'))
}

fn authorization_header(token: &CorrelationToken) -> Option<HeaderValue> {
    let token = std::str::from_utf8(token.as_bytes()).ok()?;
    let mut value = HeaderValue::from_str(&format!("Token {}", token)).ok()?;
    value.set_sensitive(true);
    Some(value)
}

fn parse_member_response(body: &[u8]) -> Result<Verdict, VerifierError> {
    let member: MemberResponse = serde_json::from_slice(body)
        .map_err(|e| VerifierError::InvalidResponse(e.to_string()))?;

    let id = match member.d.as_ref().and_then(|d| d.get("id")) {
        Some(id) => id,
        None => {
            tracing::debug!(success = member.s, message = %member.m, "Backend returned no member");
            return Ok(Verdict::Rejected);
        }
    };

    let id = id
        .as_u64()
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| VerifierError::InvalidResponse(format!("member id {} is not a u32", id)))?;
    Ok(Verdict::Accepted(UserId::new(id)))
}
