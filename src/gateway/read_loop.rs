//! Read path: one thread waiting on the multiplexer for every connection.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::domain::{packet, AuthSubmission};
use crate::ports::ReadOutcome;
use crate::telemetry::metrics as names;

use super::{Connection, Gateway, Readiness};

/// What servicing one ready connection did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOutcome {
    /// Still live; `messages` client messages were consumed.
    Alive { messages: usize },

    /// Torn down, or found already dead.
    Killed,
}

/// The multiplexer wait loop.
pub struct ReadLoop {
    gateway: Arc<Gateway>,
    timeout: Option<Duration>,
}

impl ReadLoop {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            timeout: None,
        }
    }

    /// Bounds each wait. `None` blocks until an event arrives.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs on a dedicated OS thread. `on_exit` receives the error that
    /// stopped the loop.
    pub fn spawn<F>(self, on_exit: F) -> io::Result<thread::JoinHandle<()>>
    where
        F: FnOnce(io::Error) + Send + 'static,
    {
        thread::Builder::new()
            .name("gateway-read-loop".to_string())
            .spawn(move || on_exit(self.run()))
    }

    /// Waits and services connections until the multiplexer fails.
    pub fn run(&self) -> io::Error {
        tracing::info!("Read loop started");
        loop {
            if let Err(e) = self.poll_once() {
                tracing::error!("Multiplexer wait failed: {}", e);
                return e;
            }
        }
    }

    /// One wait plus servicing of everything it reported.
    pub fn poll_once(&self) -> io::Result<usize> {
        let ready = self
            .gateway
            .multiplexer()
            .wait(self.gateway.connections(), self.timeout)?;
        for readiness in &ready {
            self.service(readiness);
        }
        Ok(ready.len())
    }

    /// Flushes queued output, then drains every buffered client message.
    ///
    /// Reads are retried after a writable event too: a read that stopped on
    /// a blocked control-frame reply would otherwise lose its edge. Any read
    /// or flush error kills the connection and stops servicing it.
    pub fn service(&self, readiness: &Readiness) -> ServiceOutcome {
        let conn = &readiness.connection;
        if conn.is_closed() {
            return ServiceOutcome::Killed;
        }

        if readiness.writable {
            if let Err(e) = conn.flush() {
                self.gateway.kill_on_error(conn, &e);
                return ServiceOutcome::Killed;
            }
        }

        let mut messages = 0;
        loop {
            match conn.read() {
                Ok(ReadOutcome::Message(bytes)) => {
                    messages += 1;
                    self.handle_message(conn, &bytes);
                }
                Ok(ReadOutcome::Drained) => break,
                Err(e) => {
                    self.gateway.kill_on_error(conn, &e);
                    return ServiceOutcome::Killed;
                }
            }
        }
        ServiceOutcome::Alive { messages }
    }

    fn handle_message(&self, conn: &Arc<Connection>, bytes: &[u8]) {
        let submission = match AuthSubmission::parse(bytes) {
            Ok(submission) => submission,
            Err(e) => {
                tracing::debug!(connection = %conn.id(), "Ignoring client message: {}", e);
                return;
            }
        };

        // Binding is permanent, so a bound connection has nothing to ask for.
        if let Some(user_id) = self.gateway.identities().user_of(conn) {
            tracing::debug!(
                connection = %conn.id(),
                user_id = user_id.as_u32(),
                "Ignoring token from authenticated connection"
            );
            return;
        }

        let token = submission.correlation_token();
        let request = packet::auth_request(&token);
        if let Some(previous) = self.gateway.correlations().put(token.clone(), conn.clone()) {
            if previous.id() != conn.id() {
                tracing::debug!(
                    connection = %conn.id(),
                    displaced = %previous.id(),
                    "Token already pending for another connection"
                );
            }
        }

        match self.gateway.publisher().publish(request) {
            Ok(()) => {
                metrics::counter!(names::AUTH_REQUESTS).increment(1);
                tracing::debug!(connection = %conn.id(), "Authentication requested");
            }
            Err(e) => {
                self.gateway.correlations().take(&token);
                tracing::warn!(connection = %conn.id(), "Failed to publish auth request: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{CorrelationToken, UserId};
    use crate::gateway::test_support::{admit, gateway};
    use crate::gateway::Dispatcher;
    use std::io::Write;

    fn ready(conn: &Arc<Connection>, readable: bool, writable: bool) -> Readiness {
        Readiness {
            connection: conn.clone(),
            readable,
            writable,
        }
    }

    #[test]
    fn token_submission_publishes_request_and_stores_correlation() {
        let (gw, publisher) = gateway();
        let a = admit(&gw);
        a.control.push_message(br#"{"token":"abc"}"#);

        let outcome = ReadLoop::new(gw.clone()).service(&ready(&a.conn, true, false));

        assert_eq!(outcome, ServiceOutcome::Alive { messages: 1 });
        assert_eq!(publisher.published(), vec![b"\x80abc".to_vec()]);
        let waiting = gw.correlations().take(&CorrelationToken::from("abc")).unwrap();
        assert_eq!(waiting.id(), a.conn.id());
    }

    #[test]
    fn drains_every_buffered_message() {
        let (gw, publisher) = gateway();
        let a = admit(&gw);
        a.control.push_message(br#"{"token":"one"}"#);
        a.control.push_message(b"noise");
        a.control.push_message(br#"{"token":"two"}"#);

        let outcome = ReadLoop::new(gw.clone()).service(&ready(&a.conn, true, false));

        assert_eq!(outcome, ServiceOutcome::Alive { messages: 3 });
        assert_eq!(publisher.published().len(), 2);
        // Only the latest submission stays pending.
        assert_eq!(gw.correlations().len(), 1);
        assert!(gw.correlations().take(&CorrelationToken::from("two")).is_some());
    }

    #[test]
    fn repeated_submissions_keep_one_pending_request() {
        let (gw, publisher) = gateway();
        let a = admit(&gw);
        for i in 0..500 {
            a.control.push_message(format!(r#"{{"token":"t{i}"}}"#).as_bytes());
        }

        ReadLoop::new(gw.clone()).service(&ready(&a.conn, true, false));

        assert_eq!(publisher.published().len(), 500);
        assert!(gw.correlations().len() <= 1);
    }

    #[test]
    fn authenticated_connection_cannot_submit_more_tokens() {
        let (gw, publisher) = gateway();
        let a = admit(&gw);
        gw.identities().bind(UserId::new(7), &a.conn);
        for i in 0..50 {
            a.control.push_message(format!(r#"{{"token":"t{i}"}}"#).as_bytes());
        }

        let outcome = ReadLoop::new(gw.clone()).service(&ready(&a.conn, true, false));

        assert_eq!(outcome, ServiceOutcome::Alive { messages: 50 });
        assert!(publisher.published().is_empty());
        assert!(gw.correlations().is_empty());
        assert_eq!(gw.identities().user_of(&a.conn), Some(UserId::new(7)));
    }

    #[test]
    fn empty_token_is_forwarded_for_verification() {
        let (gw, publisher) = gateway();
        let a = admit(&gw);
        a.control.push_message(br#"{"token":""}"#);

        ReadLoop::new(gw.clone()).service(&ready(&a.conn, true, false));

        assert_eq!(publisher.published(), vec![vec![0x80]]);
        assert_eq!(gw.correlations().len(), 1);
    }

    #[test]
    fn auth_round_trip_binds_user_and_clears_request() {
        let (gw, publisher) = gateway();
        let a = admit(&gw);
        a.control.push_message(br#"{"token":"abc"}"#);

        ReadLoop::new(gw.clone()).service(&ready(&a.conn, true, false));
        assert_eq!(publisher.published(), vec![b"\x80abc".to_vec()]);
        assert_eq!(gw.correlations().len(), 1);

        Dispatcher::new(gw.clone())
            .dispatch(b"\x03\x00\x00\x00\x07abc")
            .unwrap();

        let bound: Vec<_> = gw
            .identities()
            .lookup(UserId::new(7))
            .iter()
            .map(|c| c.id())
            .collect();
        assert_eq!(bound, vec![a.conn.id()]);
        assert_eq!(gw.identities().user_of(&a.conn), Some(UserId::new(7)));
        assert!(gw.correlations().take(&CorrelationToken::from("abc")).is_none());
        assert!(gw.correlations().is_empty());
    }

    #[test]
    fn malformed_message_is_ignored() {
        let (gw, publisher) = gateway();
        let a = admit(&gw);
        a.control.push_message(b"{\"nope\": true}");

        ReadLoop::new(gw.clone()).service(&ready(&a.conn, true, false));

        assert!(publisher.published().is_empty());
        assert!(gw.correlations().is_empty());
        assert!(gw.connections().contains(&a.conn));
    }

    #[test]
    fn read_error_kills_connection() {
        let (gw, _) = gateway();
        let a = admit(&gw);
        a.control.push_read_error();

        let outcome = ReadLoop::new(gw.clone()).service(&ready(&a.conn, true, false));

        assert_eq!(outcome, ServiceOutcome::Killed);
        assert!(!gw.connections().contains(&a.conn));
        assert!(a.control.is_closed());
    }

    #[test]
    fn publish_failure_forgets_correlation() {
        let (gw, publisher) = gateway();
        let a = admit(&gw);
        publisher.set_failing(true);
        a.control.push_message(br#"{"token":"abc"}"#);

        ReadLoop::new(gw.clone()).service(&ready(&a.conn, true, false));

        assert!(gw.correlations().is_empty());
        assert!(gw.connections().contains(&a.conn));
    }

    #[test]
    fn writable_flushes_transport() {
        let (gw, _) = gateway();
        let a = admit(&gw);

        ReadLoop::new(gw.clone()).service(&ready(&a.conn, false, true));

        assert_eq!(a.control.flush_calls(), 1);
    }

    #[test]
    fn dead_connection_is_not_serviced() {
        let (gw, publisher) = gateway();
        let a = admit(&gw);
        a.control.push_message(br#"{"token":"abc"}"#);
        gw.kill(&a.conn);

        let outcome = ReadLoop::new(gw.clone()).service(&ready(&a.conn, true, true));

        assert_eq!(outcome, ServiceOutcome::Killed);
        assert!(publisher.published().is_empty());
    }

    #[test]
    fn poll_once_services_connections_with_input() {
        let (gw, publisher) = gateway();
        let mut a = admit(&gw);
        a.control.push_message(br#"{"token":"abc"}"#);
        a.remote.write_all(b"x").unwrap();

        let read_loop = ReadLoop::new(gw.clone()).with_timeout(Some(Duration::from_millis(200)));
        for _ in 0..10 {
            read_loop.poll_once().unwrap();
            if !publisher.published().is_empty() {
                break;
            }
        }

        assert_eq!(publisher.published(), vec![b"\x80abc".to_vec()]);
    }
}
