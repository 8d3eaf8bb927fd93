//! Scriptable in-memory transport for testing.
//!
//! # Security Note
//!
//! This adapter is for **testing only** and should not be used in production.
//! It uses `.expect()` on lock operations which will panic if locks are poisoned.

use std::collections::VecDeque;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};

use crate::ports::{ReadOutcome, Transport, TransportError};

#[derive(Default)]
struct MockState {
    inbound: VecDeque<Scripted>,
    sent: Vec<Vec<u8>>,
    fail_writes: bool,
    closed: bool,
    close_calls: usize,
    flush_calls: usize,
}

enum Scripted {
    Message(Vec<u8>),
    Error,
}

/// Transport whose reads are scripted and whose writes are recorded.
///
/// # Example
///
/// ```ignore
/// let (transport, control) = MockTransport::new(10);
/// control.push_message(br#"{"token":"abc"}"#);
/// let conn = gateway.admit(Box::new(transport))?;
/// assert_eq!(control.sent_text(), vec!["hi"]);
/// ```
pub struct MockTransport {
    descriptor: RawFd,
    state: Arc<Mutex<MockState>>,
}

/// Test-side handle onto a [`MockTransport`].
#[derive(Clone)]
pub struct MockControl {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Creates a transport reporting `descriptor`, plus its control.
    pub fn new(descriptor: RawFd) -> (Self, MockControl) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                descriptor,
                state: state.clone(),
            },
            MockControl { state },
        )
    }
}

impl Transport for MockTransport {
    fn descriptor(&self) -> RawFd {
        self.descriptor
    }

    fn read_message(&mut self) -> Result<ReadOutcome, TransportError> {
        let mut state = self.state.lock().expect("MockTransport: state lock poisoned");
        if state.closed {
            return Err(TransportError::Closed);
        }
        match state.inbound.pop_front() {
            Some(Scripted::Message(bytes)) => Ok(ReadOutcome::Message(bytes)),
            Some(Scripted::Error) => Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "scripted read failure",
            ))),
            None => Ok(ReadOutcome::Drained),
        }
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock().expect("MockTransport: state lock poisoned");
        if state.closed {
            return Err(TransportError::Closed);
        }
        if state.fail_writes {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "scripted write failure",
            )));
        }
        state.sent.push(payload.to_vec());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock().expect("MockTransport: state lock poisoned");
        state.flush_calls += 1;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock().expect("MockTransport: state lock poisoned");
        state.closed = true;
        state.close_calls += 1;
    }
}

impl MockControl {
    /// Queues an inbound client message.
    pub fn push_message(&self, bytes: &[u8]) {
        self.lock().inbound.push_back(Scripted::Message(bytes.to_vec()));
    }

    /// Queues a read failure.
    pub fn push_read_error(&self) {
        self.lock().inbound.push_back(Scripted::Error);
    }

    /// Makes every subsequent send fail.
    pub fn fail_writes(&self) {
        self.lock().fail_writes = true;
    }

    /// Payloads successfully sent so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    /// Payloads sent so far, decoded as UTF-8 (lossy).
    pub fn sent_text(&self) -> Vec<String> {
        self.lock()
            .sent
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }

    pub fn flush_calls(&self) -> usize {
        self.lock().flush_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("MockControl: state lock poisoned")
    }
}
