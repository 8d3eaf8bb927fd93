//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the gateway core to external systems:
//! - `websocket` - Client upgrade and non-blocking WebSocket transport
//! - `bus` - Redis pub/sub bus and publishers
//! - `auth` - Identity verifiers
//! - `http` - Health and metrics endpoints

pub mod auth;
pub mod bus;
pub mod http;
pub mod websocket;

pub use auth::{BackendVerifier, StaticVerifier};
pub use bus::{InMemoryBusPublisher, QueuedPublisher, RedisBus};
pub use websocket::{Acceptor, AcceptorConfig, WsTransport};
