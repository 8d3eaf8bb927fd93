//! HTTP adapters - operational endpoints.
//!
//! Served on the metrics address, separate from the WebSocket listener:
//! - `GET /health` - Gateway counts as JSON
//! - `GET /metrics` - Prometheus metrics

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::HealthResponse;
pub use handlers::OpsAppState;
pub use routes::ops_router;
