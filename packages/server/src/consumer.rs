//! The consume loop: drives the broker delivery stream, hands each
//! delivery to the router on its own task, and maps the router's
//! disposition to ack/nack.
//!
//! Deliveries arrive in FIFO order but are processed concurrently, so
//! replies may be published out of delivery order. The prefetch limit is
//! the sole backpressure mechanism; the gate mirrors it so the number of
//! concurrently running delivery tasks never exceeds it either.

use std::sync::Arc;

use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{error, info};

use crate::router::{Disposition, InboundMessage, RouterContext};
use crate::shutdown::ShutdownController;

// ---------------------------------------------------------------------------
// ConcurrencyGate
// ---------------------------------------------------------------------------

/// Bounds the number of concurrently processing deliveries.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyGate {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
        }
    }

    /// Waits for a free slot. The slot is released when the returned
    /// permit drops.
    ///
    /// # Panics
    ///
    /// Panics if the semaphore is closed, which this type never does.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("gate semaphore is never closed")
    }

    /// Currently free slots.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

// ---------------------------------------------------------------------------
// RelayConsumer
// ---------------------------------------------------------------------------

/// Runs the consume loop until shutdown or stream end.
pub struct RelayConsumer {
    router: Arc<RouterContext>,
    shutdown: Arc<ShutdownController>,
    gate: ConcurrencyGate,
}

impl RelayConsumer {
    #[must_use]
    pub fn new(
        router: Arc<RouterContext>,
        shutdown: Arc<ShutdownController>,
        prefetch: u16,
    ) -> Self {
        Self {
            router,
            shutdown,
            gate: ConcurrencyGate::new(usize::from(prefetch)),
        }
    }

    /// Consumes deliveries until the shutdown signal fires or the
    /// stream ends. Per-message failures are absorbed by the router;
    /// only transport-level stream errors propagate.
    ///
    /// # Errors
    ///
    /// Returns an error when the delivery stream reports a transport
    /// failure.
    pub async fn run(&self, mut deliveries: lapin::Consumer) -> anyhow::Result<()> {
        let mut shutdown_rx = self.shutdown.shutdown_receiver();
        self.shutdown.set_consuming();

        loop {
            tokio::select! {
                delivery = deliveries.next() => {
                    match delivery {
                        Some(Ok(delivery)) => self.dispatch_delivery(delivery),
                        Some(Err(e)) => {
                            error!(error = %e, "delivery stream failed");
                            return Err(e.into());
                        }
                        None => {
                            info!("delivery stream ended");
                            return Ok(());
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!(
                        in_flight = self.shutdown.in_flight_count(),
                        "shutdown signalled, leaving consume loop"
                    );
                    return Ok(());
                }
            }
        }
    }

    /// Spawns one delivery task. Each runs independently of other
    /// in-flight deliveries; the gate (sized to the prefetch limit)
    /// bounds how many run at once. The gate is acquired inside the
    /// task so the consume loop never blocks on a full gate and keeps
    /// observing the shutdown signal.
    fn dispatch_delivery(&self, delivery: Delivery) {
        let guard = self.shutdown.in_flight_guard();
        let gate = self.gate.clone();
        let router = Arc::clone(&self.router);

        tokio::spawn(async move {
            let permit = gate.acquire().await;
            let msg = inbound_message(&delivery);
            let disposition = router.handle(msg).await;

            // The reply (if any) is already published; only now does the
            // delivery leave the queue.
            let result = match disposition {
                Disposition::Ack => delivery.ack(BasicAckOptions::default()).await,
                Disposition::Reject => {
                    delivery
                        .nack(BasicNackOptions {
                            requeue: false,
                            ..BasicNackOptions::default()
                        })
                        .await
                }
            };
            if let Err(e) = result {
                error!(error = %e, "acknowledgment failed");
            }

            drop(guard);
            drop(permit);
        });
    }
}

/// Projects a broker delivery onto the router's transport-agnostic view.
fn inbound_message(delivery: &Delivery) -> InboundMessage {
    let properties = &delivery.properties;
    InboundMessage {
        body: delivery.data.clone(),
        operation: properties.kind().as_ref().map(|s| s.as_str().to_owned()),
        correlation_id: properties
            .correlation_id()
            .as_ref()
            .map(|s| s.as_str().to_owned()),
        reply_to: properties.reply_to().as_ref().map(|s| s.as_str().to_owned()),
    }
}
