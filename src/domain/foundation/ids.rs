//! Strongly-typed identifier value objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Canonical identity of one client connection.
///
/// Allocated from a process-wide sequence when the connection is admitted and
/// never reused, unlike the descriptor, which the OS recycles. Every map that
/// needs "the same connection" compares this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next unused connection identity.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw sequence number.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// User identifier as carried on the bus (32-bit, big-endian on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u32);

impl UserId {
    /// Creates a UserId from its numeric value.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Decodes a UserId from four big-endian bytes.
    pub fn from_be_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    /// Encodes the UserId as four big-endian bytes.
    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Returns the numeric value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for UserId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Key matching an asynchronous authentication verdict to its connection.
///
/// This is the client's credential token, verbatim. `Debug` never prints the
/// bytes so the token cannot leak through logs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CorrelationToken(Vec<u8>);

impl CorrelationToken {
    /// Returns the token bytes as sent on the bus.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of bytes in the token.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the token carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationToken(<redacted, {} bytes>)", self.0.len())
    }
}

impl From<&str> for CorrelationToken {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<&[u8]> for CorrelationToken {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}
