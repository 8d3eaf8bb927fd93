//! HTTP handlers for the operational endpoints.

use std::sync::Arc;

use axum::extract::{Json, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::gateway::Gateway;

use super::dto::HealthResponse;

/// Shared state for the operational endpoints.
#[derive(Clone)]
pub struct OpsAppState {
    pub gateway: Arc<Gateway>,
    pub metrics: PrometheusHandle,
}

impl OpsAppState {
    pub fn new(gateway: Arc<Gateway>, metrics: PrometheusHandle) -> Self {
        Self { gateway, metrics }
    }
}

/// `GET /health` - connection counts; 503 while draining.
pub async fn health(State(state): State<OpsAppState>) -> impl IntoResponse {
    let body = HealthResponse::from_gateway(&state.gateway);
    let status = if state.gateway.is_draining() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(body))
}

/// `GET /metrics` - Prometheus text exposition.
pub async fn metrics(State(state): State<OpsAppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
