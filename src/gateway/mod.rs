//! Gateway core: connection multiplexing, identity tracking and fan-out.
//!
//! # Architecture
//!
//! ```text
//!   acceptor ──admit──►┌──────────────────────── Gateway ───────────────────────┐
//!                      │ ConnectionRegistry   fd → Connection                   │
//!                      │ Multiplexer          epoll/kqueue readiness            │
//!                      │ IdentityIndex        user ↔ connections                │
//!                      │ CorrelationStore     token → connection (in flight)    │
//!                      └────────────────────────────────────────────────────────┘
//!                          ▲ ReadLoop (OS thread)          ▲ Dispatcher (bus task)
//!                          │ wait → read → submit auth     │ packet → fan-out / bind
//! ```
//!
//! Every teardown funnels through [`Gateway::kill`], which is idempotent.
//! Fan-out never kills while enumerating: dead connections are collected
//! into a graveyard and killed once the pass is over, because `kill` takes
//! the registry, multiplexer and index locks itself.

mod connection;
mod correlation_store;
mod dispatcher;
mod identity_index;
mod multiplexer;
mod read_loop;
mod registry;

#[cfg(test)]
pub(crate) mod test_support;

pub use connection::Connection;
pub use correlation_store::CorrelationStore;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use identity_index::{BindOutcome, IdentityIndex};
pub use multiplexer::{Multiplexer, Readiness, DEFAULT_EVENT_CAPACITY};
pub use read_loop::{ReadLoop, ServiceOutcome};
pub use registry::ConnectionRegistry;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::ports::{BusPublisher, Transport, TransportError};
use crate::telemetry::metrics as gauges;

/// Errors admitting a new connection.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway is shutting down; connection refused")]
    Draining,

    #[error("Failed to register connection with the multiplexer: {0}")]
    Register(#[from] io::Error),
}

/// Result of delivering one payload to a set of connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Connections that accepted the payload.
    pub delivered: usize,
    /// Connections found dead and killed after the pass.
    pub dead: usize,
}

/// The gateway aggregate. Shared as `Arc<Gateway>` by the read loop, the
/// bus consumer, the acceptor and the HTTP surface.
pub struct Gateway {
    connections: ConnectionRegistry,
    identities: IdentityIndex,
    correlations: CorrelationStore,
    multiplexer: Multiplexer,
    publisher: Arc<dyn BusPublisher>,
    draining: AtomicBool,
}

impl Gateway {
    /// Assembles a gateway around an existing multiplexer.
    pub fn new(multiplexer: Multiplexer, publisher: Arc<dyn BusPublisher>) -> Self {
        Self {
            connections: ConnectionRegistry::new(),
            identities: IdentityIndex::new(),
            correlations: CorrelationStore::new(),
            multiplexer,
            publisher,
            draining: AtomicBool::new(false),
        }
    }

    /// Creates the multiplexer and the gateway around it.
    pub fn create(publisher: Arc<dyn BusPublisher>, event_capacity: usize) -> io::Result<Self> {
        Ok(Self::new(Multiplexer::create(event_capacity)?, publisher))
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn identities(&self) -> &IdentityIndex {
        &self.identities
    }

    pub fn correlations(&self) -> &CorrelationStore {
        &self.correlations
    }

    pub fn multiplexer(&self) -> &Multiplexer {
        &self.multiplexer
    }

    pub fn publisher(&self) -> &dyn BusPublisher {
        self.publisher.as_ref()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Takes ownership of an upgraded client stream.
    ///
    /// The connection is added to the registry before the multiplexer, so
    /// its first readiness event always resolves.
    pub fn admit(&self, mut transport: Box<dyn Transport>) -> Result<Arc<Connection>, GatewayError> {
        if self.is_draining() {
            transport.close();
            return Err(GatewayError::Draining);
        }

        let conn = Connection::new(transport);
        if let Some(stale) = self.connections.add(conn.clone()) {
            self.retire_displaced(&stale);
        }

        if let Err(e) = self.multiplexer.register(&conn) {
            self.connections.remove(&conn);
            conn.mark_closed();
            conn.close_transport();
            return Err(GatewayError::Register(e));
        }

        let live = self.connections.len();
        metrics::counter!(gauges::CONNECTIONS_ACCEPTED).increment(1);
        metrics::gauge!(gauges::CONNECTIONS_ACTIVE).set(live as f64);
        if live % 100 == 0 {
            tracing::info!(connections = live, "Concurrent connections");
        }
        tracing::debug!(
            connection = %conn.id(),
            descriptor = conn.descriptor(),
            "Connection admitted"
        );
        Ok(conn)
    }

    /// Tears a connection down everywhere.
    ///
    /// Deregisters from the multiplexer, removes from the registry, closes
    /// the transport, unbinds the user and drops pending auth requests.
    /// Returns false, doing nothing, if the connection was already dead.
    pub fn kill(&self, conn: &Connection) -> bool {
        self.tear_down(conn, None)
    }

    /// [`kill`](Self::kill) for a connection whose transport failed. The
    /// error is logged only if this call is the one that tore it down.
    pub fn kill_on_error(&self, conn: &Connection, error: &TransportError) -> bool {
        self.tear_down(conn, Some(error))
    }

    fn tear_down(&self, conn: &Connection, cause: Option<&TransportError>) -> bool {
        if !conn.mark_closed() {
            return false;
        }

        if self.connections.contains(conn) {
            if let Err(e) = self.multiplexer.deregister(conn) {
                tracing::debug!(connection = %conn.id(), "Multiplexer deregister failed: {}", e);
            }
            self.connections.remove(conn);
        }
        conn.close_transport();
        let user_id = self.identities.unbind(conn);
        let abandoned = self.correlations.purge(conn);

        let live = self.connections.len();
        metrics::counter!(gauges::CONNECTIONS_KILLED).increment(1);
        metrics::gauge!(gauges::CONNECTIONS_ACTIVE).set(live as f64);
        if live % 100 == 0 {
            tracing::info!(connections = live, "Concurrent connections");
        }
        tracing::debug!(
            connection = %conn.id(),
            user_id = user_id.map(|u| u.as_u32()),
            abandoned_auth = abandoned,
            error = cause.map(tracing::field::display),
            "Connection killed"
        );
        true
    }

    /// Sends `payload` to every target, then kills the ones that failed.
    ///
    /// Targets are a copy taken by the caller; no gateway lock is held while
    /// writing or while burying the graveyard. Targets some other path
    /// already killed are skipped and not counted as dead.
    pub fn fan_out(&self, targets: &[Arc<Connection>], payload: &[u8]) -> FanoutReport {
        let mut graveyard = Vec::new();
        let mut delivered = 0;

        for conn in targets {
            if conn.is_closed() {
                continue;
            }
            match conn.send(payload) {
                Ok(()) => delivered += 1,
                Err(e) => graveyard.push((conn, e)),
            }
        }

        let dead = graveyard
            .iter()
            .filter(|(grave, error)| self.kill_on_error(grave, error))
            .count();

        metrics::counter!(gauges::MESSAGES_DELIVERED).increment(delivered as u64);
        FanoutReport { delivered, dead }
    }

    /// Refuses new connections and broadcasts `notice` to the live ones.
    pub fn begin_drain(&self, notice: &[u8]) -> FanoutReport {
        self.draining.store(true, Ordering::Release);
        let report = self.fan_out(&self.connections.snapshot(), notice);
        tracing::info!(
            delivered = report.delivered,
            dead = report.dead,
            "Close notice broadcast"
        );
        report
    }

    // A descriptor can only be displaced if its previous owner's stream was
    // closed behind our back. The descriptor now belongs to the new
    // connection, so the stale one is retired without touching the OS.
    fn retire_displaced(&self, stale: &Connection) {
        tracing::warn!(
            connection = %stale.id(),
            descriptor = stale.descriptor(),
            "Descriptor reused while still registered; retiring stale connection"
        );
        stale.mark_closed();
        self.identities.unbind(stale);
        self.correlations.purge(stale);
    }
}
