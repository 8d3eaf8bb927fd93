//! Message bus adapters.
//!
//! Adapters implement the bus publishing port and the inbound packet
//! stream for different environments:
//!
//! - `RedisBus` - Redis pub/sub subscription and publisher task
//! - `QueuedPublisher` - Non-blocking front for the publisher task
//! - `InMemoryBusPublisher` - Captures packets for tests

mod in_memory;
mod queued;
mod redis;

pub use in_memory::InMemoryBusPublisher;
pub use queued::{QueuedPublisher, DEFAULT_PUBLISH_QUEUE};
pub use self::redis::RedisBus;
