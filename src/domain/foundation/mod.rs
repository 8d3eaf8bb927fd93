//! Foundation module - Shared domain primitives.
//!
//! Contains the identifiers and error types that form the vocabulary of the
//! gateway.

mod errors;
mod ids;

pub use errors::{ClientMessageError, PacketError};
pub use ids::{ConnectionId, CorrelationToken, UserId};
