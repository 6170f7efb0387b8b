//! Response cache: correlation id to last published reply.
//!
//! Lets external pollers retrieve a result after the fact. Bounded by
//! capacity with LRU-style eviction and a retention TTL, so absence of an
//! entry is indistinguishable from "still processing" or "never decoded".

use std::sync::Arc;
use std::time::{Duration, Instant};

use quick_cache::sync::Cache;

use crate::config::CacheConfig;

#[derive(Debug, Clone)]
struct Entry {
    payload: Arc<Vec<u8>>,
    stored_at: Instant,
}

/// Bounded correlation-id keyed store of serialized replies.
/// Last write wins; reads past the TTL behave as absent.
pub struct ResponseCache {
    inner: Cache<String, Entry>,
    ttl: Duration,
}

impl ResponseCache {
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: Cache::new(config.capacity),
            ttl: config.ttl,
        }
    }

    /// Stores a reply payload, overwriting any previous entry.
    pub fn put(&self, correlation_id: impl Into<String>, payload: Vec<u8>) {
        self.inner.insert(
            correlation_id.into(),
            Entry {
                payload: Arc::new(payload),
                stored_at: Instant::now(),
            },
        );
    }

    /// Returns the stored payload, or `None` for unknown or expired ids.
    /// Expired entries are dropped on read.
    #[must_use]
    pub fn get(&self, correlation_id: &str) -> Option<Arc<Vec<u8>>> {
        let entry = self.inner.get(correlation_id)?;
        if entry.stored_at.elapsed() > self.ttl {
            self.inner.remove(correlation_id);
            return None;
        }
        Some(entry.payload)
    }

    /// Number of live entries, expired ones included until read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("len", &self.inner.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}
