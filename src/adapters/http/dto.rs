//! HTTP DTOs for the operational endpoints.

use serde::Serialize;

use crate::gateway::Gateway;

/// Response for `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"draining"` once shutdown has begun.
    pub status: &'static str,
    /// Live client connections.
    pub connections: usize,
    /// Distinct authenticated users.
    pub users: usize,
    /// Connections bound to a user.
    pub authenticated_connections: usize,
    /// Authentication requests awaiting a verdict.
    pub pending_auth: usize,
}

impl HealthResponse {
    pub fn from_gateway(gateway: &Gateway) -> Self {
        Self {
            status: if gateway.is_draining() { "draining" } else { "ok" },
            connections: gateway.connections().len(),
            users: gateway.identities().user_count(),
            authenticated_connections: gateway.identities().binding_count(),
            pending_auth: gateway.correlations().len(),
        }
    }
}
