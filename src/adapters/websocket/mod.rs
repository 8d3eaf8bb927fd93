//! WebSocket adapters for client connections.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          Acceptor                                    │
//! │   tokio accept → blocking handshake (path check, timeout)           │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                     │
//!                                     │ WsTransport (non-blocking)
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        Gateway::admit                                │
//! │   registry + multiplexer, served by the read loop thereafter        │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`acceptor`] - TCP accept and WebSocket upgrade
//! - [`transport`] - `Transport` over a tungstenite socket
//! - [`mock`] - Scriptable transport for tests

pub mod acceptor;
pub mod mock;
pub mod transport;

pub use acceptor::{upgrade, Acceptor, AcceptorConfig, UpgradeError};
pub use mock::{MockControl, MockTransport};
pub use transport::WsTransport;
