//! BusConsumer - Feeds subscription packets to the dispatcher.

use std::sync::Arc;

use futures::{Stream, StreamExt};

use crate::domain::foundation::PacketError;
use crate::gateway::{DispatchOutcome, Dispatcher};
use crate::ports::BusError;

use super::AuthResolver;

/// Consumes the bus subscription.
///
/// Every packet is dispatched in arrival order. Authentication requests are
/// handed to the resolver, when there is one, on their own task so a slow
/// identity backend does not hold up fan-out.
pub struct BusConsumer {
    dispatcher: Dispatcher,
    resolver: Option<Arc<AuthResolver>>,
    channel: String,
}

impl BusConsumer {
    pub fn new(dispatcher: Dispatcher, channel: impl Into<String>) -> Self {
        Self {
            dispatcher,
            resolver: None,
            channel: channel.into(),
        }
    }

    /// Answers `0x80` requests in-process.
    pub fn with_resolver(mut self, resolver: Arc<AuthResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Dispatches one raw packet.
    pub fn handle(&self, raw: &[u8]) -> Result<DispatchOutcome, PacketError> {
        let outcome = self.dispatcher.dispatch(raw)?;

        if let DispatchOutcome::AuthRequested(token) = &outcome {
            if let Some(resolver) = &self.resolver {
                let resolver = resolver.clone();
                let token = token.clone();
                tokio::spawn(async move {
                    if let Err(e) = resolver.resolve(token).await {
                        tracing::warn!("Failed to publish auth verdict: {}", e);
                    }
                });
            }
        }

        Ok(outcome)
    }

    /// Consumes `packets` until the stream ends.
    ///
    /// Malformed packets are logged and skipped. The end of the stream means
    /// the subscription was lost and is returned as an error.
    pub async fn run<S>(&self, mut packets: S) -> Result<(), BusError>
    where
        S: Stream<Item = Vec<u8>> + Unpin,
    {
        while let Some(raw) = packets.next().await {
            match self.handle(&raw) {
                Ok(outcome) => tracing::trace!(?outcome, "Dispatched bus packet"),
                Err(e) => tracing::warn!(len = raw.len(), "Dropping bus packet: {}", e),
            }
        }

        tracing::error!(channel = %self.channel, "Bus subscription ended");
        Err(BusError::SubscriptionClosed(self.channel.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::StaticVerifier;
    use crate::domain::foundation::{CorrelationToken, UserId};
    use crate::gateway::test_support::{admit, gateway};
    use futures::stream;
    use std::time::Duration;

    #[tokio::test]
    async fn run_dispatches_in_order_and_reports_closed_subscription() {
        let (gw, _publisher) = gateway();
        let a = admit(&gw);
        let consumer = BusConsumer::new(Dispatcher::new(gw.clone()), "websocket");

        let packets = vec![b"\x00one".to_vec(), b"\x00two".to_vec()];
        let result = consumer.run(stream::iter(packets)).await;

        assert!(matches!(result, Err(BusError::SubscriptionClosed(ref c)) if c == "websocket"));
        assert_eq!(a.control.sent_text(), vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn malformed_packets_are_skipped() {
        let (gw, _publisher) = gateway();
        let a = admit(&gw);
        let consumer = BusConsumer::new(Dispatcher::new(gw.clone()), "websocket");

        let packets = vec![b"\x7fjunk".to_vec(), b"\x01\x00".to_vec(), b"\x00ok".to_vec()];
        let _ = consumer.run(stream::iter(packets)).await;

        assert_eq!(a.control.sent_text(), vec!["ok".to_string()]);
    }

    #[tokio::test]
    async fn auth_request_without_resolver_publishes_nothing() {
        let (gw, publisher) = gateway();
        let consumer = BusConsumer::new(Dispatcher::new(gw.clone()), "websocket");

        let outcome = consumer.handle(b"\x80abc").unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::AuthRequested(CorrelationToken::from("abc"))
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn auth_request_with_resolver_publishes_verdict() {
        let (gw, publisher) = gateway();
        let resolver = Arc::new(AuthResolver::new(
            Arc::new(StaticVerifier::new().with_user("abc", UserId::new(7))),
            publisher.clone(),
        ));
        let consumer =
            BusConsumer::new(Dispatcher::new(gw.clone()), "websocket").with_resolver(resolver);

        consumer.handle(b"\x80abc").unwrap();

        let mut published = Vec::new();
        for _ in 0..50 {
            published = publisher.published();
            if !published.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(published, vec![b"\x03\x00\x00\x00\x07abc".to_vec()]);
    }

    #[tokio::test]
    async fn resolved_verdict_binds_the_waiting_connection() {
        let (gw, publisher) = gateway();
        let a = admit(&gw);
        gw.correlations().put(CorrelationToken::from("abc"), a.conn.clone());
        let resolver = Arc::new(AuthResolver::new(
            Arc::new(StaticVerifier::new().with_user("abc", UserId::new(7))),
            publisher.clone(),
        ));
        let consumer =
            BusConsumer::new(Dispatcher::new(gw.clone()), "websocket").with_resolver(resolver);

        consumer.handle(b"\x80abc").unwrap();
        for _ in 0..50 {
            if !publisher.published().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        // Our own verdict comes back over the subscription.
        for packet in publisher.drain() {
            consumer.handle(&packet).unwrap();
        }

        assert_eq!(gw.identities().user_of(&a.conn), Some(UserId::new(7)));
    }
}
