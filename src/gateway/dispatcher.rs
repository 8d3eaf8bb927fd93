//! Fan-out dispatcher: applies inbound bus packets to the gateway.

use std::sync::Arc;

use crate::domain::foundation::{CorrelationToken, PacketError, UserId};
use crate::domain::Packet;
use crate::telemetry::metrics as names;

use super::{BindOutcome, FanoutReport, Gateway};

/// What a dispatched packet did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Payload sent to every live connection.
    Broadcast(FanoutReport),

    /// Payload sent to one user's connections.
    Targeted { user_id: UserId, report: FanoutReport },

    /// A failure verdict arrived. `resolved` is false for unknown tokens.
    AuthRejected { resolved: bool },

    /// A success verdict arrived. `bind` is `None` for unknown tokens or a
    /// connection that died before it could be bound.
    AuthAccepted {
        user_id: UserId,
        bind: Option<BindOutcome>,
    },

    /// An authentication request seen on the channel. The dispatcher does
    /// not answer these; an in-process resolver may.
    AuthRequested(CorrelationToken),
}

/// Applies bus packets against the registry, identity index and
/// correlation store.
#[derive(Clone)]
pub struct Dispatcher {
    gateway: Arc<Gateway>,
}

impl Dispatcher {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Decodes and applies one raw packet.
    ///
    /// Malformed packets are returned as errors without touching any state.
    pub fn dispatch(&self, raw: &[u8]) -> Result<DispatchOutcome, PacketError> {
        let packet = Packet::decode(raw)?;
        metrics::counter!(names::BUS_PACKETS, "kind" => packet.tag().as_str()).increment(1);
        Ok(self.apply(packet))
    }

    /// Applies an already decoded packet.
    pub fn apply(&self, packet: Packet<'_>) -> DispatchOutcome {
        match packet {
            Packet::Broadcast { payload } => {
                let targets = self.gateway.connections().snapshot();
                DispatchOutcome::Broadcast(self.gateway.fan_out(&targets, payload))
            }
            Packet::Targeted { user_id, payload } => {
                let targets = self.gateway.identities().lookup(user_id);
                let report = self.gateway.fan_out(&targets, payload);
                tracing::trace!(
                    user_id = user_id.as_u32(),
                    delivered = report.delivered,
                    "Targeted message dispatched"
                );
                DispatchOutcome::Targeted { user_id, report }
            }
            Packet::AuthFailure { token } => self.reject(&token),
            Packet::AuthSuccess { user_id, token } => self.accept(user_id, &token),
            Packet::AuthRequest { token } => DispatchOutcome::AuthRequested(token),
        }
    }

    // The client stays connected, unauthenticated.
    fn reject(&self, token: &CorrelationToken) -> DispatchOutcome {
        let resolved = match self.gateway.correlations().take(token) {
            Some(conn) => {
                tracing::debug!(connection = %conn.id(), "Authentication rejected");
                metrics::counter!(names::AUTH_RESOLVED, "outcome" => "rejected").increment(1);
                true
            }
            None => {
                tracing::debug!(?token, "Rejection for unknown token ignored");
                metrics::counter!(names::AUTH_RESOLVED, "outcome" => "unknown").increment(1);
                false
            }
        };
        DispatchOutcome::AuthRejected { resolved }
    }

    fn accept(&self, user_id: UserId, token: &CorrelationToken) -> DispatchOutcome {
        let Some(conn) = self.gateway.correlations().take(token) else {
            tracing::debug!(?token, "Acceptance for unknown token ignored");
            metrics::counter!(names::AUTH_RESOLVED, "outcome" => "unknown").increment(1);
            return DispatchOutcome::AuthAccepted { user_id, bind: None };
        };

        let outcome = self.gateway.identities().bind(user_id, &conn);

        // Lost a race with kill: its unbind may already have run.
        if conn.is_closed() {
            self.gateway.identities().unbind(&conn);
            return DispatchOutcome::AuthAccepted { user_id, bind: None };
        }

        match outcome {
            BindOutcome::Bound => {
                tracing::debug!(
                    connection = %conn.id(),
                    user_id = user_id.as_u32(),
                    "Connection authenticated"
                );
            }
            BindOutcome::AlreadyBound(existing) => {
                tracing::debug!(
                    connection = %conn.id(),
                    user_id = existing.as_u32(),
                    requested = user_id.as_u32(),
                    "Connection already authenticated; keeping first identity"
                );
            }
        }
        metrics::counter!(names::AUTH_RESOLVED, "outcome" => "accepted").increment(1);
        DispatchOutcome::AuthAccepted {
            user_id,
            bind: Some(outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::test_support::{admit, gateway};

    fn dispatcher() -> (Dispatcher, Arc<crate::adapters::bus::InMemoryBusPublisher>) {
        let (gateway, publisher) = gateway();
        (Dispatcher::new(gateway), publisher)
    }

    fn targeted(user: u32, payload: &[u8]) -> Vec<u8> {
        Packet::Targeted {
            user_id: UserId::new(user),
            payload,
        }
        .encode()
    }

    fn success(user: u32, token: &str) -> Vec<u8> {
        Packet::AuthSuccess {
            user_id: UserId::new(user),
            token: CorrelationToken::from(token),
        }
        .encode()
    }

    #[test]
    fn broadcast_skips_and_buries_dead_connection() {
        let (dispatcher, _) = dispatcher();
        let gw = dispatcher.gateway().clone();
        let a = admit(&gw);
        let b = admit(&gw);
        let c = admit(&gw);
        gw.identities().bind(UserId::new(2), &b.conn);
        b.control.fail_writes();

        let outcome = dispatcher.dispatch(b"\x00hi").unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::Broadcast(FanoutReport { delivered: 2, dead: 1 })
        );
        assert_eq!(a.control.sent_text(), vec!["hi"]);
        assert_eq!(c.control.sent_text(), vec!["hi"]);
        assert!(!gw.connections().contains(&b.conn));
        assert!(gw.identities().lookup(UserId::new(2)).is_empty());
        assert!(b.control.is_closed());
    }

    #[test]
    fn targeted_reaches_every_connection_of_user() {
        let (dispatcher, _) = dispatcher();
        let gw = dispatcher.gateway().clone();
        let a = admit(&gw);
        let b = admit(&gw);
        let other = admit(&gw);
        gw.identities().bind(UserId::new(7), &a.conn);
        gw.identities().bind(UserId::new(7), &b.conn);
        gw.identities().bind(UserId::new(8), &other.conn);

        dispatcher.dispatch(&targeted(7, b"msg")).unwrap();

        assert_eq!(a.control.sent_text(), vec!["msg"]);
        assert_eq!(b.control.sent_text(), vec!["msg"]);
        assert!(other.control.sent().is_empty());
    }

    #[test]
    fn targeted_to_unknown_user_delivers_nothing() {
        let (dispatcher, _) = dispatcher();
        let gw = dispatcher.gateway().clone();
        let a = admit(&gw);

        let outcome = dispatcher.dispatch(&targeted(99, b"msg")).unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::Targeted {
                user_id: UserId::new(99),
                report: FanoutReport::default()
            }
        );
        assert!(a.control.sent().is_empty());
    }

    #[test]
    fn targeted_dead_connection_is_unbound() {
        let (dispatcher, _) = dispatcher();
        let gw = dispatcher.gateway().clone();
        let a = admit(&gw);
        let b = admit(&gw);
        gw.identities().bind(UserId::new(7), &a.conn);
        gw.identities().bind(UserId::new(7), &b.conn);
        a.control.fail_writes();

        dispatcher.dispatch(&targeted(7, b"msg")).unwrap();

        let remaining: Vec<_> = gw
            .identities()
            .lookup(UserId::new(7))
            .iter()
            .map(|c| c.id())
            .collect();
        assert_eq!(remaining, vec![b.conn.id()]);
        assert!(gw.identities().is_consistent());
    }

    #[test]
    fn auth_success_binds_waiting_connection() {
        let (dispatcher, _) = dispatcher();
        let gw = dispatcher.gateway().clone();
        let a = admit(&gw);
        gw.correlations()
            .put(CorrelationToken::from("abc"), a.conn.clone());

        let outcome = dispatcher.dispatch(&success(7, "abc")).unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::AuthAccepted {
                user_id: UserId::new(7),
                bind: Some(BindOutcome::Bound)
            }
        );
        assert_eq!(gw.identities().user_of(&a.conn), Some(UserId::new(7)));
        assert!(gw.correlations().take(&CorrelationToken::from("abc")).is_none());
    }

    #[test]
    fn auth_success_for_dead_connection_leaves_no_binding() {
        let (dispatcher, _) = dispatcher();
        let gw = dispatcher.gateway().clone();
        let a = admit(&gw);
        gw.correlations()
            .put(CorrelationToken::from("abc"), a.conn.clone());
        // Marked dead but the rest of kill has not run yet.
        a.conn.mark_closed();

        let outcome = dispatcher.dispatch(&success(7, "abc")).unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::AuthAccepted {
                user_id: UserId::new(7),
                bind: None
            }
        );
        assert!(gw.identities().lookup(UserId::new(7)).is_empty());
        assert!(gw.identities().is_consistent());
    }

    #[test]
    fn auth_failure_consumes_token_and_keeps_connection() {
        let (dispatcher, _) = dispatcher();
        let gw = dispatcher.gateway().clone();
        let a = admit(&gw);
        gw.correlations()
            .put(CorrelationToken::from("abc"), a.conn.clone());

        let outcome = dispatcher.dispatch(b"\x02abc").unwrap();

        assert_eq!(outcome, DispatchOutcome::AuthRejected { resolved: true });
        assert!(gw.correlations().is_empty());
        assert!(gw.connections().contains(&a.conn));
        assert!(!a.control.is_closed());
        assert_eq!(gw.identities().user_of(&a.conn), None);
    }

    #[test]
    fn unknown_token_changes_nothing() {
        let (dispatcher, _) = dispatcher();
        let gw = dispatcher.gateway().clone();
        let a = admit(&gw);
        gw.correlations()
            .put(CorrelationToken::from("abc"), a.conn.clone());

        let rejected = dispatcher.dispatch(b"\x02zzz").unwrap();
        let accepted = dispatcher.dispatch(&success(7, "zzz")).unwrap();

        assert_eq!(rejected, DispatchOutcome::AuthRejected { resolved: false });
        assert_eq!(
            accepted,
            DispatchOutcome::AuthAccepted {
                user_id: UserId::new(7),
                bind: None
            }
        );
        assert_eq!(gw.correlations().len(), 1);
        assert_eq!(gw.identities().binding_count(), 0);
    }

    #[test]
    fn auth_request_is_surfaced_not_answered() {
        let (dispatcher, publisher) = dispatcher();

        let outcome = dispatcher.dispatch(b"\x80abc").unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::AuthRequested(CorrelationToken::from("abc"))
        );
        assert!(publisher.published().is_empty());
    }

    #[test]
    fn malformed_packets_are_errors() {
        let (dispatcher, _) = dispatcher();
        assert_eq!(dispatcher.dispatch(b""), Err(PacketError::Empty));
        assert_eq!(
            dispatcher.dispatch(b"\x09x"),
            Err(PacketError::UnknownTag(0x09))
        );
        assert!(matches!(
            dispatcher.dispatch(b"\x01\x00\x07"),
            Err(PacketError::Truncated { .. })
        ));
    }
}
