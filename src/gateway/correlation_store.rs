//! In-flight authentication requests: token → requesting connection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::foundation::{ConnectionId, CorrelationToken};

use super::connection::Connection;

#[derive(Default)]
struct Pending {
    by_token: HashMap<CorrelationToken, Arc<Connection>>,
    by_connection: HashMap<ConnectionId, CorrelationToken>,
}

impl Pending {
    fn remove_token(&mut self, token: &CorrelationToken) -> Option<Arc<Connection>> {
        let conn = self.by_token.remove(token)?;
        if self.by_connection.get(&conn.id()) == Some(token) {
            self.by_connection.remove(&conn.id());
        }
        Some(conn)
    }

    fn remove_connection(&mut self, id: ConnectionId) -> Option<CorrelationToken> {
        let token = self.by_connection.remove(&id)?;
        if self.by_token.get(&token).map(|c| c.id()) == Some(id) {
            self.by_token.remove(&token);
        }
        Some(token)
    }
}

/// Thread-safe store resolving bus verdicts back to connections.
///
/// An entry lives from the client's submission until the matching verdict
/// [`take`](Self::take)s it. Verdicts for unknown tokens find nothing. Each
/// connection has at most one request in flight; a newer submission
/// replaces the older one.
#[derive(Default)]
pub struct CorrelationStore {
    pending: Mutex<Pending>,
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an in-flight request, dropping any earlier request from the
    /// same connection. Last writer wins for a repeated token.
    ///
    /// Returns the connection previously waiting on `token`, if any.
    pub fn put(&self, token: CorrelationToken, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        let mut pending = self.lock();
        pending.remove_connection(conn.id());
        let displaced = pending.remove_token(&token);
        pending.by_connection.insert(conn.id(), token.clone());
        pending.by_token.insert(token, conn);
        displaced
    }

    /// Atomically removes and returns the connection waiting on `token`.
    pub fn take(&self, token: &CorrelationToken) -> Option<Arc<Connection>> {
        self.lock().remove_token(token)
    }

    /// Drops the request made by `conn`. Returns how many were dropped.
    pub fn purge(&self, conn: &Connection) -> usize {
        usize::from(self.lock().remove_connection(conn.id()).is_some())
    }

    pub fn len(&self) -> usize {
        self.lock().by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().by_token.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
