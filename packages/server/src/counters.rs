//! Per-operation usage counters.
//!
//! A capability injected into the router context: either real atomic
//! counters or a no-op, selected once by configuration. The pipeline
//! never checks a flag itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

/// Snapshot of one operation's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpCounts {
    /// Requests received for this operation.
    pub consumed: u64,
    /// Replies published for this operation.
    pub published: u64,
}

/// Usage-recording capability.
///
/// No atomicity is guaranteed *across* the two counters of one
/// operation; a transient `consumed > published` window is expected.
pub trait UsageRecorder: Send + Sync {
    /// Record that a request for `operation` was received.
    fn record_consumed(&self, operation: &str);

    /// Record that a reply for `operation` was published.
    fn record_published(&self, operation: &str);

    /// Read all counters as an operation-name keyed mapping.
    fn snapshot(&self) -> HashMap<String, OpCounts>;
}

/// Monotonic per-operation counters backed by a concurrent map.
#[derive(Debug, Default)]
pub struct AtomicUsageCounters {
    ops: DashMap<String, Arc<OpSlot>>,
}

#[derive(Debug, Default)]
struct OpSlot {
    consumed: AtomicU64,
    published: AtomicU64,
}

impl AtomicUsageCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, operation: &str) -> Arc<OpSlot> {
        if let Some(slot) = self.ops.get(operation) {
            return Arc::clone(slot.value());
        }
        self.ops
            .entry(operation.to_string())
            .or_default()
            .value()
            .clone()
    }
}

impl UsageRecorder for AtomicUsageCounters {
    fn record_consumed(&self, operation: &str) {
        self.slot(operation).consumed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_published(&self, operation: &str) {
        self.slot(operation).published.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> HashMap<String, OpCounts> {
        self.ops
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    OpCounts {
                        consumed: entry.value().consumed.load(Ordering::Relaxed),
                        published: entry.value().published.load(Ordering::Relaxed),
                    },
                )
            })
            .collect()
    }
}

/// No-op recorder used when counters are disabled by configuration.
#[derive(Debug, Default)]
pub struct NoopUsageCounters;

impl UsageRecorder for NoopUsageCounters {
    fn record_consumed(&self, _operation: &str) {}

    fn record_published(&self, _operation: &str) {}

    fn snapshot(&self) -> HashMap<String, OpCounts> {
        HashMap::new()
    }
}
