//! Application layer - Bus consumption, in-process auth and the runtime.
//!
//! The gateway core is synchronous and knows nothing about Redis or tokio.
//! This layer wires it to the bus subscription and drives the process.

pub mod auth_resolver;
pub mod bus_consumer;
pub mod runtime;

pub use auth_resolver::AuthResolver;
pub use bus_consumer::BusConsumer;
pub use runtime::{raise_fd_limit, run, StartupError};
