//! Redis pub/sub bus for production deployments.
//!
//! One channel carries everything: inbound packets (broadcasts, targeted
//! messages, verdicts) arrive over a dedicated subscription connection, and
//! outbound authentication requests are `PUBLISH`ed on a multiplexed
//! connection by a single publisher task.

use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tokio::sync::mpsc;

use crate::ports::BusError;

/// Handle on the Redis server and the gateway's channel.
#[derive(Clone)]
pub struct RedisBus {
    client: Client,
    channel: String,
}

impl RedisBus {
    /// Opens a client and pings the server.
    ///
    /// A failed ping is retried once after `retry_delay`; a second failure
    /// is returned to the caller as fatal.
    pub async fn connect(url: &str, channel: &str, retry_delay: Duration) -> Result<Self, BusError> {
        let bus = Self {
            client: Client::open(url)?,
            channel: channel.to_string(),
        };

        if let Err(first) = bus.ping().await {
            tracing::warn!(
                retry_in_secs = retry_delay.as_secs(),
                "Redis not reachable, retrying: {}",
                first
            );
            tokio::time::sleep(retry_delay).await;
            bus.ping().await?;
        }

        tracing::info!(channel = %bus.channel, "Connected to Redis");
        Ok(bus)
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    async fn ping(&self) -> Result<(), BusError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn connection(&self) -> Result<MultiplexedConnection, BusError> {
        Ok(self.client.get_multiplexed_tokio_connection().await?)
    }

    /// Subscribes to the channel and returns the stream of raw packets.
    ///
    /// The stream ends when the subscription connection is lost.
    pub async fn subscribe(&self) -> Result<BoxStream<'static, Vec<u8>>, BusError> {
        let mut pubsub = self.client.get_async_connection().await?.into_pubsub();
        pubsub.subscribe(&self.channel).await?;
        tracing::info!(channel = %self.channel, "Subscribed to bus channel");

        Ok(pubsub
            .into_on_message()
            .map(|msg| msg.get_payload_bytes().to_vec())
            .boxed())
    }

    /// Publishes queued packets until every sender is dropped.
    ///
    /// A failed `PUBLISH` loses that packet only; the request it carried
    /// simply never resolves.
    pub async fn run_publisher(&self, mut packets: mpsc::Receiver<Vec<u8>>) -> Result<(), BusError> {
        let mut conn = self.connection().await?;
        while let Some(packet) = packets.recv().await {
            if let Err(e) = conn.publish::<_, _, ()>(&self.channel, packet).await {
                tracing::warn!(channel = %self.channel, "Publish failed: {}", e);
            }
        }
        tracing::debug!("Bus publisher stopped");
        Ok(())
    }
}
