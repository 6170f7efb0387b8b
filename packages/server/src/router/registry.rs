//! Operation-name keyed table of locally-served handlers.
//!
//! A handful of reserved operations are answered by the relay itself
//! instead of being forwarded to the backend connector. The table is
//! resolved once at startup; lookup misses fall through to the
//! connector.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use corebridge_core::{CallContext, ReplyBody};
use serde_json::{json, Map, Value};

use crate::counters::UsageRecorder;

/// Reserved operation: reports the adapter's name and version.
pub const OP_GET_ADAPTER_INFO: &str = "getAdapterInfo";
/// Reserved operation: reports the per-operation usage counters.
pub const OP_GET_USAGE_COUNTERS: &str = "getUsageCounters";

type HandlerFuture = Pin<Box<dyn Future<Output = ReplyBody> + Send>>;

/// A locally-served operation handler.
pub type LocalHandler =
    Arc<dyn Fn(Map<String, Value>, CallContext) -> HandlerFuture + Send + Sync>;

/// Registry of locally-served operations, resolved once at startup.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, LocalHandler>,
}

impl HandlerRegistry {
    /// Creates an empty registry (no reserved operations).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry preloaded with the reserved operations.
    #[must_use]
    pub fn with_builtins(
        adapter_name: &str,
        adapter_version: &str,
        counters: Arc<dyn UsageRecorder>,
    ) -> Self {
        let mut registry = Self::new();

        let name = adapter_name.to_string();
        let version = adapter_version.to_string();
        registry.register(OP_GET_ADAPTER_INFO, move |_payload, _ctx| {
            let mut data = Map::new();
            data.insert("name".to_string(), Value::String(name.clone()));
            data.insert("version".to_string(), Value::String(version.clone()));
            async move {
                ReplyBody::Success {
                    data,
                    messages: Vec::new(),
                }
            }
        });

        registry.register(OP_GET_USAGE_COUNTERS, move |_payload, _ctx| {
            let snapshot = counters.snapshot();
            let mut ops = Map::new();
            for (op, counts) in snapshot {
                ops.insert(
                    op,
                    json!({"consumed": counts.consumed, "published": counts.published}),
                );
            }
            let mut data = Map::new();
            data.insert("counters".to_string(), Value::Object(ops));
            async move {
                ReplyBody::Success {
                    data,
                    messages: Vec::new(),
                }
            }
        });

        registry
    }

    /// Registers a handler for `operation`, replacing any previous one.
    pub fn register<F, Fut>(&mut self, operation: impl Into<String>, handler: F)
    where
        F: Fn(Map<String, Value>, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ReplyBody> + Send + 'static,
    {
        self.handlers.insert(
            operation.into(),
            Arc::new(move |payload, ctx| Box::pin(handler(payload, ctx))),
        );
    }

    /// Looks up the handler for `operation`, if one is registered.
    #[must_use]
    pub fn get(&self, operation: &str) -> Option<LocalHandler> {
        self.handlers.get(operation).cloned()
    }

    /// Registered operation names, for startup logging.
    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("operations", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
