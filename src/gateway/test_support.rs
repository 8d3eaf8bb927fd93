//! Helpers for gateway unit tests: mock transports on real descriptors.

use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::Arc;

use crate::adapters::bus::InMemoryBusPublisher;
use crate::adapters::websocket::{MockControl, MockTransport};

use super::{Connection, Gateway};

/// An admitted mock connection. The socket pair keeps the descriptor open
/// (and unique) for as long as the test holds it.
pub struct Socket {
    pub conn: Arc<Connection>,
    pub control: MockControl,
    pub remote: UnixStream,
    _local: UnixStream,
}

pub fn gateway() -> (Arc<Gateway>, Arc<InMemoryBusPublisher>) {
    let publisher = Arc::new(InMemoryBusPublisher::new());
    let gateway = Gateway::create(publisher.clone(), 64).unwrap();
    (Arc::new(gateway), publisher)
}

pub fn admit(gateway: &Gateway) -> Socket {
    let (local, remote) = UnixStream::pair().unwrap();
    let (transport, control) = MockTransport::new(local.as_raw_fd());
    let conn = gateway.admit(Box::new(transport)).unwrap();
    Socket {
        conn,
        control,
        remote,
        _local: local,
    }
}
