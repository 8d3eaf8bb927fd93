//! Connection registry: descriptor → live connection.
//!
//! The registry is the single source of truth for "is this connection still
//! live". It backs the multiplexer (readiness events carry descriptors and
//! are resolved here) and feeds broadcast fan-out through [`snapshot`].
//!
//! Descriptors are recycled by the OS, so every mutation that acts on a
//! specific connection compares the stored [`ConnectionId`] rather than
//! trusting the descriptor alone.
//!
//! [`snapshot`]: ConnectionRegistry::snapshot
//! [`ConnectionId`]: crate::domain::foundation::ConnectionId

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::{Arc, PoisonError, RwLock};

use super::connection::Connection;

/// Thread-safe map of live connections keyed by descriptor.
///
/// Uses `RwLock` since enumeration (broadcast, readiness resolution) vastly
/// outnumbers add/remove.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<RawFd, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection under its descriptor.
    ///
    /// Returns the stale entry it displaced, if the descriptor was still
    /// mapped to an older connection.
    pub fn add(&self, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(conn.descriptor(), conn)
    }

    /// Removes `conn` if, and only if, its descriptor still maps to it.
    ///
    /// Removing an absent connection is a no-op and returns false.
    pub fn remove(&self, conn: &Connection) -> bool {
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match connections.get(&conn.descriptor()) {
            Some(stored) if stored.id() == conn.id() => {
                connections.remove(&conn.descriptor());
                true
            }
            _ => false,
        }
    }

    /// True when `conn` itself (not merely its descriptor) is registered.
    pub fn contains(&self, conn: &Connection) -> bool {
        self.read()
            .get(&conn.descriptor())
            .is_some_and(|stored| stored.id() == conn.id())
    }

    /// Resolves a batch of descriptors under one read lock.
    ///
    /// Descriptors with no live entry are skipped.
    pub fn resolve<I>(&self, descriptors: I) -> Vec<Arc<Connection>>
    where
        I: IntoIterator<Item = RawFd>,
    {
        let connections = self.read();
        descriptors
            .into_iter()
            .filter_map(|fd| connections.get(&fd).cloned())
            .collect()
    }

    /// Point-in-time copy of every live connection.
    ///
    /// The lock is released before this returns, so callers can write to
    /// (and kill) the connections without holding it.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<RawFd, Arc<Connection>>> {
        self.connections.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::websocket::MockTransport;

    fn conn(fd: RawFd) -> Arc<Connection> {
        let (transport, _control) = MockTransport::new(fd);
        Connection::new(Box::new(transport))
    }

    #[test]
    fn add_then_snapshot_contains_connection() {
        let registry = ConnectionRegistry::new();
        let a = conn(10);
        registry.add(a.clone());

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), a.id());
        assert!(registry.contains(&a));
    }

    #[test]
    fn remove_absent_connection_is_noop() {
        let registry = ConnectionRegistry::new();
        let a = conn(10);
        assert!(!registry.remove(&a));
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_twice_only_succeeds_once() {
        let registry = ConnectionRegistry::new();
        let a = conn(10);
        registry.add(a.clone());

        assert!(registry.remove(&a));
        assert!(!registry.remove(&a));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn stale_handle_cannot_remove_reused_descriptor() {
        let registry = ConnectionRegistry::new();
        let old = conn(10);
        let new = conn(10);

        registry.add(old.clone());
        assert!(registry.remove(&old));
        registry.add(new.clone());

        assert!(!registry.remove(&old));
        assert!(registry.contains(&new));
        assert!(!registry.contains(&old));
    }

    #[test]
    fn add_reports_displaced_entry() {
        let registry = ConnectionRegistry::new();
        let old = conn(10);
        let new = conn(10);

        assert!(registry.add(old.clone()).is_none());
        let displaced = registry.add(new).unwrap();
        assert_eq!(displaced.id(), old.id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn resolve_skips_unknown_descriptors() {
        let registry = ConnectionRegistry::new();
        let a = conn(10);
        let b = conn(11);
        registry.add(a.clone());
        registry.add(b.clone());

        let resolved = registry.resolve([10, 99, 11]);
        let ids: Vec<_> = resolved.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![a.id(), b.id()]);
    }

    #[test]
    fn snapshot_is_detached_from_later_mutation() {
        let registry = ConnectionRegistry::new();
        let a = conn(10);
        registry.add(a.clone());

        let snapshot = registry.snapshot();
        registry.remove(&a);

        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty());
        assert!(registry.resolve([10]).is_empty());
    }
}
