//! BusPublisher port - Interface for publishing packets onto the bus.
//!
//! The read loop runs on a plain OS thread, so publishing is synchronous and
//! must not block: adapters enqueue the packet and deliver it from their own
//! task.

use thiserror::Error;

/// Errors raised by bus adapters.
#[derive(Debug, Error)]
pub enum BusError {
    /// Redis communication error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The publisher task has gone away
    #[error("Bus publisher is closed")]
    PublisherClosed,

    /// Outbound queue is full; the packet was dropped
    #[error("Bus publish queue is full")]
    QueueFull,

    /// The subscription stream ended
    #[error("Bus subscription on '{0}' closed")]
    SubscriptionClosed(String),
}

/// Port for publishing raw packets on the bus channel.
///
/// Delivery is best-effort and at-most-once.
///
/// # Example
///
/// ```ignore
/// publisher.publish(packet::auth_request(&token))?;
/// ```
pub trait BusPublisher: Send + Sync {
    /// Queues one packet for publication.
    fn publish(&self, packet: Vec<u8>) -> Result<(), BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn BusPublisher) {}

    #[test]
    fn subscription_closed_names_channel() {
        let err = BusError::SubscriptionClosed("websocket".to_string());
        assert_eq!(err.to_string(), "Bus subscription on 'websocket' closed");
    }
}
