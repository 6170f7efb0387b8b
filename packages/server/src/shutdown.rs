//! Relay lifecycle and graceful drain.
//!
//! The consume loop stops taking new deliveries the moment shutdown is
//! signalled; deliveries already handed to the router keep running.
//! Each of those holds an [`InFlightGuard`] backed by a watch channel,
//! so the drain completes the instant the last guard drops instead of
//! sampling a counter on a timer.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;

/// Relay lifecycle state.
///
/// State machine: Starting -> Consuming -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Connecting and declaring queues; not consuming yet.
    Starting,
    /// Consume loop is running.
    Consuming,
    /// Shutdown signalled; in-flight deliveries are finishing.
    Draining,
    /// All in-flight deliveries accounted for.
    Stopped,
}

/// Coordinates shutdown across the consume loop and delivery tasks.
#[derive(Debug)]
pub struct ShutdownController {
    shutdown_signal: watch::Sender<bool>,
    in_flight: Arc<watch::Sender<u64>>,
    state: ArcSwap<RelayState>,
}

impl ShutdownController {
    /// Creates a controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_signal, _) = watch::channel(false);
        let (in_flight, _) = watch::channel(0);
        Self {
            shutdown_signal,
            in_flight: Arc::new(in_flight),
            state: ArcSwap::from_pointee(RelayState::Starting),
        }
    }

    /// Marks the consume loop as running.
    pub fn set_consuming(&self) {
        self.state.store(Arc::new(RelayState::Consuming));
    }

    /// Returns a receiver notified when shutdown is triggered.
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_signal.subscribe()
    }

    /// Initiates shutdown: transitions to `Draining` and wakes every
    /// subscribed receiver. New deliveries are no longer picked up.
    pub fn trigger_shutdown(&self) {
        self.state.store(Arc::new(RelayState::Draining));
        self.shutdown_signal.send_replace(true);
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RelayState {
        **self.state.load()
    }

    /// Registers one in-flight delivery. The returned guard deregisters
    /// it on drop, even if the delivery task panics.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.send_modify(|active| *active += 1);
        InFlightGuard {
            counter: Arc::clone(&self.in_flight),
        }
    }

    /// Number of deliveries currently being processed.
    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        *self.in_flight.borrow()
    }

    /// Waits until every in-flight delivery has finished, up to
    /// `timeout`. Completion is signalled by the guards themselves;
    /// there is no polling interval.
    ///
    /// Returns `true` and transitions to `Stopped` on a clean drain;
    /// returns `false` (state stays `Draining`) on timeout.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let mut active = self.in_flight.subscribe();
        let drained = match tokio::time::timeout(timeout, active.wait_for(|n| *n == 0)).await {
            Ok(Ok(_)) => {
                self.state.store(Arc::new(RelayState::Stopped));
                true
            }
            // Timeout, or the channel closed (unreachable while self lives).
            _ => false,
        };
        drained
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Deregisters its delivery from the drain accounting when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    counter: Arc<watch::Sender<u64>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.send_modify(|active| *active -= 1);
    }
}
