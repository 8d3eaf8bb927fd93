//! Identity index: user id ↔ connections.
//!
//! Two coupled maps kept under one mutex:
//!
//! ```text
//! forward: user-7  → [conn-1, conn-4]
//!          user-9  → [conn-2]
//! reverse: conn-1 → user-7, conn-4 → user-7, conn-2 → user-9
//! ```
//!
//! Every operation mutates both maps inside the same critical section, so
//! `conn ∈ forward[uid] ⟺ reverse[conn] == uid` holds whenever the lock is
//! free.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::foundation::{ConnectionId, UserId};

use super::connection::Connection;

/// Result of a bind attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The connection is now bound to the requested user.
    Bound,

    /// The connection was already bound (to this user id); nothing changed.
    AlreadyBound(UserId),
}

#[derive(Default)]
struct IdentityMaps {
    forward: HashMap<UserId, Vec<Arc<Connection>>>,
    reverse: HashMap<ConnectionId, UserId>,
}

/// Thread-safe bidirectional user ↔ connection index.
#[derive(Default)]
pub struct IdentityIndex {
    maps: Mutex<IdentityMaps>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `conn` to `user_id`.
    ///
    /// A connection binds once per lifetime: if it already has a user, this
    /// is a no-op whatever `user_id` is.
    pub fn bind(&self, user_id: UserId, conn: &Arc<Connection>) -> BindOutcome {
        let mut maps = self.lock();
        if let Some(existing) = maps.reverse.get(&conn.id()) {
            return BindOutcome::AlreadyBound(*existing);
        }
        maps.forward.entry(user_id).or_default().push(conn.clone());
        maps.reverse.insert(conn.id(), user_id);
        BindOutcome::Bound
    }

    /// Removes `conn` from the index, returning the user it was bound to.
    ///
    /// The user's entry is deleted once its last connection goes.
    pub fn unbind(&self, conn: &Connection) -> Option<UserId> {
        let mut maps = self.lock();
        let user_id = maps.reverse.remove(&conn.id())?;

        if let Some(conns) = maps.forward.get_mut(&user_id) {
            if let Some(pos) = conns.iter().position(|c| c.id() == conn.id()) {
                conns.swap_remove(pos);
            }
            if conns.is_empty() {
                maps.forward.remove(&user_id);
            }
        }
        Some(user_id)
    }

    /// Copies out the connections currently bound to `user_id`.
    ///
    /// Entries may die between this call and the caller's write; the
    /// dispatcher's graveyard handles that.
    pub fn lookup(&self, user_id: UserId) -> Vec<Arc<Connection>> {
        self.lock()
            .forward
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// The user `conn` is bound to, if any.
    pub fn user_of(&self, conn: &Connection) -> Option<UserId> {
        self.lock().reverse.get(&conn.id()).copied()
    }

    /// Number of distinct users with at least one connection.
    pub fn user_count(&self) -> usize {
        self.lock().forward.len()
    }

    /// Number of bound connections.
    pub fn binding_count(&self) -> usize {
        self.lock().reverse.len()
    }

    /// Checks that the forward and reverse maps agree and hold no duplicates.
    pub fn is_consistent(&self) -> bool {
        let maps = self.lock();
        let forward_pairs: usize = maps.forward.values().map(Vec::len).sum();
        if forward_pairs != maps.reverse.len() {
            return false;
        }
        maps.forward.iter().all(|(user_id, conns)| {
            !conns.is_empty()
                && conns.iter().enumerate().all(|(i, conn)| {
                    maps.reverse.get(&conn.id()) == Some(user_id)
                        && !conns[..i].iter().any(|c| c.id() == conn.id())
                })
        })
    }

    fn lock(&self) -> MutexGuard<'_, IdentityMaps> {
        self.maps.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
