//! Queue in front of the asynchronous bus connection.
//!
//! The read loop publishes from a plain OS thread and must never block on
//! the network. `QueuedPublisher` hands packets to a bounded channel; the
//! Redis publisher task drains it.

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::ports::{BusError, BusPublisher};

/// Default number of packets that may wait for the publisher task.
pub const DEFAULT_PUBLISH_QUEUE: usize = 4096;

/// Non-blocking [`BusPublisher`] backed by a bounded channel.
#[derive(Clone)]
pub struct QueuedPublisher {
    sender: mpsc::Sender<Vec<u8>>,
}

impl QueuedPublisher {
    /// Creates the publisher and the receiving end for the publisher task.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl BusPublisher for QueuedPublisher {
    fn publish(&self, packet: Vec<u8>) -> Result<(), BusError> {
        self.sender.try_send(packet).map_err(|e| match e {
            TrySendError::Full(_) => BusError::QueueFull,
            TrySendError::Closed(_) => BusError::PublisherClosed,
        })
    }
}
