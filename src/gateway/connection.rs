//! A live client connection shared by every gateway component.

use std::fmt;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::foundation::ConnectionId;
use crate::ports::{ReadOutcome, Transport, TransportError};

/// A client connection: a transport plus its stable identity.
///
/// Shared as `Arc<Connection>` by the registry, identity index, correlation
/// store and dispatcher. The transport sits behind a mutex so the read loop
/// and the dispatcher never touch the stream at the same time. The `closed`
/// flag is flipped exactly once, by the kill that tears the connection down.
pub struct Connection {
    id: ConnectionId,
    descriptor: RawFd,
    transport: Mutex<Box<dyn Transport>>,
    closed: AtomicBool,
}

impl Connection {
    /// Wraps a transport, allocating a fresh identity.
    pub fn new(transport: Box<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::next(),
            descriptor: transport.descriptor(),
            transport: Mutex::new(transport),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn descriptor(&self) -> RawFd {
        self.descriptor
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Reads one message if one is buffered.
    pub fn read(&self) -> Result<ReadOutcome, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.transport().read_message()
    }

    /// Sends one payload.
    pub fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.transport().send(payload)
    }

    /// Flushes frames the transport had to queue.
    pub fn flush(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.transport().flush()
    }

    /// Marks the connection dead. Returns true only for the first caller.
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Closes the underlying stream.
    pub(crate) fn close_transport(&self) {
        self.transport().close();
    }

    fn transport(&self) -> MutexGuard<'_, Box<dyn Transport>> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}
