//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the gateway core and the outside world. Adapters implement these ports.
//!
//! - `Transport` - A client socket that exposes its descriptor
//! - `BusPublisher` - Outbound packets onto the message bus
//! - `AuthVerifier` - Identity validation for the in-process resolver

mod auth_verifier;
mod bus_publisher;
mod transport;

pub use auth_verifier::{AuthVerifier, Verdict, VerifierError};
pub use bus_publisher::{BusError, BusPublisher};
pub use transport::{ReadOutcome, Transport, TransportError};
