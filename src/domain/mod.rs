//! Domain layer containing the gateway's value types and wire codecs.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (identifiers, tokens, errors)
//! - `packet` - Bus packet codec (tagged binary frames)
//! - `client_message` - JSON messages exchanged with WebSocket clients

pub mod client_message;
pub mod foundation;
pub mod packet;

pub use client_message::{AuthSubmission, CLOSE_NOTICE};
pub use packet::{Packet, PacketTag};
