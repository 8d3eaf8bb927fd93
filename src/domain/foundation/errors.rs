//! Error types for the domain layer.

use thiserror::Error;

/// Errors raised while decoding a bus packet.
///
/// None of these are fatal: the consumer logs the packet and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("Empty bus packet")]
    Empty,

    #[error("Unknown packet tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("Packet with tag 0x{tag:02x} is truncated: need {needed} bytes, got {actual}")]
    Truncated { tag: u8, needed: usize, actual: usize },
}

/// Errors raised while parsing a client message.
#[derive(Debug, Error)]
pub enum ClientMessageError {
    #[error("Client message is not a credential submission: {0}")]
    Malformed(#[from] serde_json::Error),
}
