//! Readiness multiplexer over the OS event facility (epoll/kqueue via mio).
//!
//! One thread sits in [`Multiplexer::wait`]; any other thread may register
//! or deregister connections at the same time through a cloned
//! `mio::Registry`. Tokens are descriptors, resolved back to connections
//! through the [`ConnectionRegistry`] under its read lock.
//!
//! Registration is edge-triggered for both directions: a readable event
//! means "drain everything buffered", a writable event means "the socket
//! accepts data again, flush what the transport queued".

use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Registry, Token};

use super::connection::Connection;
use super::registry::ConnectionRegistry;

/// Default number of events collected per wait.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// A connection reported ready by [`Multiplexer::wait`].
#[derive(Debug, Clone)]
pub struct Readiness {
    pub connection: Arc<Connection>,
    /// Input is pending, or the peer hung up / errored.
    pub readable: bool,
    /// The socket can accept writes again.
    pub writable: bool,
}

struct WaitState {
    poll: Poll,
    events: Events,
}

/// Event-notification context shared by the read loop and the admitters.
pub struct Multiplexer {
    wait_state: Mutex<WaitState>,
    registry: Registry,
}

impl Multiplexer {
    /// Allocates the OS event context. Failure here is fatal at startup.
    pub fn create(event_capacity: usize) -> io::Result<Self> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        Ok(Self {
            wait_state: Mutex::new(WaitState {
                poll,
                events: Events::with_capacity(event_capacity.max(1)),
            }),
            registry,
        })
    }

    /// Starts watching `conn` for input, hang-up and writability.
    pub fn register(&self, conn: &Connection) -> io::Result<()> {
        let fd = conn.descriptor();
        self.registry.register(
            &mut SourceFd(&fd),
            token_for(fd)?,
            Interest::READABLE | Interest::WRITABLE,
        )
    }

    /// Stops watching `conn`.
    pub fn deregister(&self, conn: &Connection) -> io::Result<()> {
        let fd = conn.descriptor();
        self.registry.deregister(&mut SourceFd(&fd))
    }

    /// Blocks until registered connections are ready or `timeout` passes.
    ///
    /// An interrupted wait reports no events instead of an error; callers
    /// simply wait again.
    pub fn wait(
        &self,
        connections: &ConnectionRegistry,
        timeout: Option<Duration>,
    ) -> io::Result<Vec<Readiness>> {
        let ready = {
            let mut state = self.wait_state.lock().unwrap_or_else(PoisonError::into_inner);
            let WaitState { poll, events } = &mut *state;

            match poll.poll(events, timeout) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
                Err(e) => return Err(e),
            }

            let mut ready: HashMap<RawFd, (bool, bool)> = HashMap::new();
            for event in events.iter() {
                let flags = ready.entry(event.token().0 as RawFd).or_default();
                flags.0 |= event.is_readable() || event.is_read_closed() || event.is_error();
                flags.1 |= event.is_writable();
            }
            ready
        };

        Ok(connections
            .resolve(ready.keys().copied())
            .into_iter()
            .filter_map(|connection| {
                let (readable, writable) = *ready.get(&connection.descriptor())?;
                Some(Readiness {
                    connection,
                    readable,
                    writable,
                })
            })
            .collect())
    }
}

fn token_for(fd: RawFd) -> io::Result<Token> {
    usize::try_from(fd)
        .map(Token)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "negative descriptor"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::websocket::MockTransport;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;

    fn socket_conn() -> (Arc<Connection>, UnixStream, UnixStream) {
        let (local, remote) = UnixStream::pair().unwrap();
        local.set_nonblocking(true).unwrap();
        let (transport, _control) = MockTransport::new(local.as_raw_fd());
        (Connection::new(Box::new(transport)), local, remote)
    }

    fn wait_until_readable(
        mux: &Multiplexer,
        registry: &ConnectionRegistry,
        conn: &Connection,
    ) -> bool {
        for _ in 0..10 {
            let ready = mux.wait(registry, Some(Duration::from_millis(200))).unwrap();
            if ready
                .iter()
                .any(|r| r.connection.id() == conn.id() && r.readable)
            {
                return true;
            }
        }
        false
    }

    #[test]
    fn reports_connection_with_pending_input() {
        let mux = Multiplexer::create(16).unwrap();
        let registry = ConnectionRegistry::new();
        let (conn, _local, mut remote) = socket_conn();

        registry.add(conn.clone());
        mux.register(&conn).unwrap();
        remote.write_all(b"ping").unwrap();

        assert!(wait_until_readable(&mux, &registry, &conn));
    }

    #[test]
    fn reports_hangup_as_readable() {
        let mux = Multiplexer::create(16).unwrap();
        let registry = ConnectionRegistry::new();
        let (conn, _local, remote) = socket_conn();

        registry.add(conn.clone());
        mux.register(&conn).unwrap();
        drop(remote);

        assert!(wait_until_readable(&mux, &registry, &conn));
    }

    #[test]
    fn unregistered_descriptors_are_not_resolved() {
        let mux = Multiplexer::create(16).unwrap();
        let registry = ConnectionRegistry::new();
        let (conn, _local, mut remote) = socket_conn();

        // Registered with the OS facility but not in the registry.
        mux.register(&conn).unwrap();
        remote.write_all(b"ping").unwrap();

        let ready = mux.wait(&registry, Some(Duration::from_millis(100))).unwrap();
        assert!(ready.is_empty());
    }

    #[test]
    fn deregistered_connection_is_silent() {
        let mux = Multiplexer::create(16).unwrap();
        let registry = ConnectionRegistry::new();
        let (conn, _local, mut remote) = socket_conn();

        registry.add(conn.clone());
        mux.register(&conn).unwrap();
        mux.deregister(&conn).unwrap();
        remote.write_all(b"ping").unwrap();

        let ready = mux.wait(&registry, Some(Duration::from_millis(100))).unwrap();
        assert!(ready.iter().all(|r| r.connection.id() != conn.id()));
    }

    #[test]
    fn deregister_unknown_descriptor_errors() {
        let mux = Multiplexer::create(16).unwrap();
        let (conn, _local, _remote) = socket_conn();
        assert!(mux.deregister(&conn).is_err());
    }

    #[test]
    fn wait_times_out_with_no_events() {
        let mux = Multiplexer::create(16).unwrap();
        let registry = ConnectionRegistry::new();
        let ready = mux.wait(&registry, Some(Duration::from_millis(10))).unwrap();
        assert!(ready.is_empty());
    }
}
