//! In-memory bus publisher for testing.
//!
//! Records every published packet for assertions and can be switched into a
//! failing mode to exercise error paths. Nothing is delivered anywhere.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::ports::{BusError, BusPublisher};

#[derive(Default)]
struct Recorded {
    packets: Vec<Vec<u8>>,
    failing: bool,
}

/// Publisher that captures packets instead of sending them.
///
/// # Example
///
/// ```ignore
/// let publisher = Arc::new(InMemoryBusPublisher::new());
/// let gateway = Gateway::create(publisher.clone(), 64)?;
///
/// // ... client submits {"token":"abc"} ...
/// assert_eq!(publisher.published(), vec![b"\x80abc".to_vec()]);
/// ```
#[derive(Default)]
pub struct InMemoryBusPublisher {
    recorded: Mutex<Recorded>,
}

impl InMemoryBusPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    /// Returns all packets published so far.
    pub fn published(&self) -> Vec<Vec<u8>> {
        self.lock().packets.clone()
    }

    /// Makes subsequent publishes fail with [`BusError::PublisherClosed`].
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Removes and returns all recorded packets.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.lock().packets)
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BusPublisher for InMemoryBusPublisher {
    fn publish(&self, packet: Vec<u8>) -> Result<(), BusError> {
        let mut recorded = self.lock();
        if recorded.failing {
            return Err(BusError::PublisherClosed);
        }
        recorded.packets.push(packet);
        Ok(())
    }
}
