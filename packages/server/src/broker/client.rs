//! AMQP connection and channel lifecycle.
//!
//! Connection and channel-open failures are fatal and propagate to the
//! caller; any reconnection behavior is a broker/deployment concern, not
//! logic owned here. Dropping the client releases the channel and
//! connection, which ends the consume loop and aborts in-flight
//! deliveries without explicit acknowledgment.

use lapin::options::{BasicConsumeOptions, BasicQosOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer};
use tracing::info;

use super::publisher::{spawn_publisher, PublisherHandle};
use crate::config::BrokerConfig;

/// Owns the broker connection, one channel, and the publisher task.
pub struct BrokerClient {
    connection: Connection,
    channel: Channel,
    publisher: PublisherHandle,
    consumer_tag: String,
}

impl BrokerClient {
    /// Connects, opens a channel, and applies the prefetch limit.
    ///
    /// # Errors
    ///
    /// Returns an error on connection or channel-open failure. Both are
    /// process-level failures for the relay.
    pub async fn connect(config: &BrokerConfig) -> anyhow::Result<Self> {
        let connection = Connection::connect(&config.uri, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .basic_qos(config.prefetch, BasicQosOptions::default())
            .await?;

        let consumer_tag = config
            .consumer_tag
            .clone()
            .unwrap_or_else(|| format!("corebridge-{}", uuid::Uuid::new_v4()));

        info!(prefetch = config.prefetch, consumer_tag = %consumer_tag, "broker channel open");

        let publisher = spawn_publisher(channel.clone(), config.publish_channel_capacity);

        Ok(Self {
            connection,
            channel,
            publisher,
            consumer_tag,
        })
    }

    /// Declares a durable queue. Idempotent: safe to call repeatedly as
    /// long as the existing queue's attributes match.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or attribute mismatch.
    pub async fn declare_queue(&self, name: &str) -> anyhow::Result<()> {
        let options = QueueDeclareOptions {
            durable: true,
            ..QueueDeclareOptions::default()
        };
        self.channel
            .queue_declare(name, options, FieldTable::default())
            .await?;
        info!(queue = name, "queue declared");
        Ok(())
    }

    /// Starts consuming from `queue` with manual acknowledgment.
    ///
    /// The returned stream yields deliveries until the channel is
    /// released; the caller owns the loop and the ack/nack decisions.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn consume(&self, queue: &str) -> anyhow::Result<Consumer> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                &self.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        info!(queue = queue, consumer_tag = %self.consumer_tag, "consuming");
        Ok(consumer)
    }

    /// The shared single-writer publish handle.
    #[must_use]
    pub fn publisher(&self) -> PublisherHandle {
        self.publisher.clone()
    }

    /// Closes the connection, releasing the channel and ending any
    /// active consume stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails.
    pub async fn close(self) -> anyhow::Result<()> {
        self.connection.close(200, "shutting down").await?;
        Ok(())
    }
}
