//! Single-writer publish discipline.
//!
//! All outgoing messages flow through one dedicated publisher task fed
//! by a bounded mpsc channel, so concurrent delivery tasks never publish
//! on the shared AMQP channel directly. Each request carries a oneshot
//! through which the caller observes publish completion; the router
//! relies on that to acknowledge a delivery only after its reply is on
//! the wire.

use async_trait::async_trait;
use lapin::options::BasicPublishOptions;
use lapin::{BasicProperties, Channel};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::error::RelayError;

/// One queued publish: payload, destination, and message properties.
#[derive(Debug)]
pub struct PublishRequest {
    pub queue: String,
    pub payload: Vec<u8>,
    /// Operation name, carried as the AMQP `type` message label.
    pub operation: Option<String>,
    pub correlation_id: Option<String>,
    done: oneshot::Sender<Result<(), RelayError>>,
}

/// Publish capability seam: the router publishes through this trait so
/// it can be exercised without a broker.
#[async_trait]
pub trait ReplyPublisher: Send + Sync {
    /// Publishes `payload` to `queue` on the default exchange and waits
    /// for transport-level completion. There is no application-level
    /// delivery confirmation beyond that.
    async fn publish(
        &self,
        queue: &str,
        payload: Vec<u8>,
        operation: Option<&str>,
        correlation_id: Option<&str>,
    ) -> Result<(), RelayError>;
}

/// Sender half feeding the publisher task. Cheap to clone; the task
/// exits once every handle is dropped.
#[derive(Debug, Clone)]
pub struct PublisherHandle {
    tx: mpsc::Sender<PublishRequest>,
}

#[async_trait]
impl ReplyPublisher for PublisherHandle {
    async fn publish(
        &self,
        queue: &str,
        payload: Vec<u8>,
        operation: Option<&str>,
        correlation_id: Option<&str>,
    ) -> Result<(), RelayError> {
        let (done, done_rx) = oneshot::channel();
        self.tx
            .send(PublishRequest {
                queue: queue.to_string(),
                payload,
                operation: operation.map(ToOwned::to_owned),
                correlation_id: correlation_id.map(ToOwned::to_owned),
                done,
            })
            .await
            .map_err(|_| RelayError::PublisherGone)?;
        done_rx.await.map_err(|_| RelayError::PublisherGone)?
    }
}

/// Spawns the publisher task over the given AMQP channel.
///
/// Returns the feeding handle; the task runs until all handles are
/// dropped and the queue is drained.
#[must_use]
pub fn spawn_publisher(channel: Channel, capacity: usize) -> PublisherHandle {
    let (tx, mut rx) = mpsc::channel::<PublishRequest>(capacity);

    tokio::spawn(async move {
        while let Some(req) = rx.recv().await {
            let PublishRequest {
                queue,
                payload,
                operation,
                correlation_id,
                done,
            } = req;

            let result = publish_one(
                &channel,
                &queue,
                &payload,
                operation.as_deref(),
                correlation_id.as_deref(),
            )
            .await;

            match &result {
                Ok(()) => debug!(queue = %queue, bytes = payload.len(), "published"),
                Err(e) => error!(queue = %queue, error = %e, "publish failed"),
            }
            // Caller may have given up waiting; that is not our problem.
            let _ = done.send(result);
        }
        debug!("publisher task exiting");
    });

    PublisherHandle { tx }
}

async fn publish_one(
    channel: &Channel,
    queue: &str,
    payload: &[u8],
    operation: Option<&str>,
    correlation_id: Option<&str>,
) -> Result<(), RelayError> {
    let mut properties = BasicProperties::default().with_content_type("application/json".into());
    if let Some(op) = operation {
        properties = properties.with_kind(op.into());
    }
    if let Some(id) = correlation_id {
        properties = properties.with_correlation_id(id.into());
    }

    // Default exchange: routing key is the queue name.
    let confirm = channel
        .basic_publish("", queue, BasicPublishOptions::default(), payload, properties)
        .await?;
    confirm.await?;
    Ok(())
}
