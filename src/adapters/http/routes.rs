//! Axum router configuration for the operational endpoints.

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::{health, metrics, OpsAppState};

/// Create the operational router.
///
/// # Routes
/// - `GET /health` - Live connection, user and pending-auth counts
/// - `GET /metrics` - Prometheus metrics
///
/// # Example
///
/// ```ignore
/// let state = OpsAppState::new(gateway.clone(), metrics_handle);
/// let app = ops_router().with_state(state);
/// axum::serve(listener, app).await?;
/// ```
pub fn ops_router() -> Router<OpsAppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
}
