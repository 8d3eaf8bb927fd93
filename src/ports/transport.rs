//! Transport port - A client byte stream the gateway can multiplex.
//!
//! The transport must expose its OS descriptor so the readiness multiplexer
//! can register it directly. Reads and writes are non-blocking: a read that
//! would block reports [`ReadOutcome::Drained`], a write that cannot be
//! flushed immediately is queued by the transport up to its own bound.

use std::io;
use std::os::unix::io::RawFd;

/// Result of one non-blocking read attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// One complete application message (text or binary payload).
    Message(Vec<u8>),

    /// No complete message is buffered; wait for the next readiness event.
    Drained,
}

/// Errors that end a connection's usefulness.
///
/// Every variant is treated as a liveness failure by the gateway.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Peer closed the stream, or it was already closed locally.
    #[error("Connection closed")]
    Closed,

    /// Outbound queue exceeded its bound (slow consumer).
    #[error("Write buffer full")]
    BufferFull,

    /// Underlying socket error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Framing or protocol violation.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Port for a bidirectional client message stream.
///
/// Implementations are driven from two threads (the read loop and the bus
/// dispatcher) but never concurrently: the owning `Connection` serialises
/// access behind a mutex.
pub trait Transport: Send {
    /// Descriptor registered with the readiness multiplexer.
    fn descriptor(&self) -> RawFd;

    /// Attempts to read one application message without blocking.
    fn read_message(&mut self) -> Result<ReadOutcome, TransportError>;

    /// Sends one payload to the client.
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Pushes any queued outbound frames to the socket.
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Closes the stream. Must tolerate being called on a dead stream.
    fn close(&mut self);
}
