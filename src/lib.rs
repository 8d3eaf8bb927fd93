//! Fanout Gateway - WebSocket fan-out for a Redis message bus.
//!
//! Clients hold WebSocket connections and may authenticate by submitting a
//! token. Packets arriving on the bus are broadcast to every connection or
//! routed to the connections of one user.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod gateway;
pub mod ports;
pub mod telemetry;
