//! Prometheus metrics for the gateway.
//!
//! All metrics follow the naming convention `gateway_<subject>_<metric>`.

use std::sync::OnceLock;

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use super::TelemetryError;

/// Live connections in the registry.
pub const CONNECTIONS_ACTIVE: &str = "gateway_connections_active";
/// Connections admitted after a successful upgrade.
pub const CONNECTIONS_ACCEPTED: &str = "gateway_connections_accepted_total";
/// Connections torn down.
pub const CONNECTIONS_KILLED: &str = "gateway_connections_killed_total";
/// Bus packets decoded, labelled by `kind`.
pub const BUS_PACKETS: &str = "gateway_bus_packets_total";
/// Successful writes of bus payloads to clients.
pub const MESSAGES_DELIVERED: &str = "gateway_messages_delivered_total";
/// Authentication requests published.
pub const AUTH_REQUESTS: &str = "gateway_auth_requests_total";
/// Verdicts received, labelled by `outcome`.
pub const AUTH_RESOLVED: &str = "gateway_auth_resolved_total";
/// Tokens checked by the in-process verifier, labelled by `outcome`.
pub const AUTH_VERIFICATIONS: &str = "gateway_auth_verifications_total";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder and describes every metric.
///
/// Returns the handle used by the `/metrics` route.
pub fn init_metrics() -> Result<PrometheusHandle, TelemetryError> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInitialization(e.to_string()))?;
    let handle = METRICS_HANDLE.get_or_init(|| handle).clone();

    register();
    Ok(handle)
}

fn register() {
    describe_gauge!(CONNECTIONS_ACTIVE, "Number of live client connections");
    describe_counter!(
        CONNECTIONS_ACCEPTED,
        "Total number of client connections admitted"
    );
    describe_counter!(
        CONNECTIONS_KILLED,
        "Total number of client connections torn down"
    );
    describe_counter!(BUS_PACKETS, "Total number of bus packets decoded, by kind");
    describe_counter!(
        MESSAGES_DELIVERED,
        "Total number of bus payloads written to clients"
    );
    describe_counter!(AUTH_REQUESTS, "Total number of authentication requests published");
    describe_counter!(
        AUTH_RESOLVED,
        "Total number of authentication verdicts received, by outcome"
    );
    describe_counter!(
        AUTH_VERIFICATIONS,
        "Total number of tokens verified in-process, by outcome"
    );
}
