//! Correlation router: the per-delivery request-processing pipeline.
//!
//! State machine per delivery:
//! decode -> dispatch -> build reply -> publish -> side effects -> ack,
//! with a side transition to rejection from any stage. Per-message
//! failures never escape into the consume loop.

pub mod registry;

use std::sync::Arc;
use std::time::Instant;

use corebridge_core::{
    decode_request, encode_reply, CallContext, Reply, ReplyBody, NOT_IMPLEMENTED,
};
use serde_json::{Map, Value};
use tracing::{error, info, info_span, warn, Instrument};

use crate::broker::ReplyPublisher;
use crate::cache::ResponseCache;
use crate::connector::{BackendConnector, ConnectorError};
use crate::counters::UsageRecorder;

pub use registry::{HandlerRegistry, OP_GET_ADAPTER_INFO, OP_GET_USAGE_COUNTERS};

/// Transport-agnostic view of one delivered message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub body: Vec<u8>,
    /// Operation name from the message `type` label.
    pub operation: Option<String>,
    /// Broker-level correlation-id property.
    pub correlation_id: Option<String>,
    /// Per-message reply destination, overriding the fallback queue.
    pub reply_to: Option<String>,
}

/// What the consume loop should do with the delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Reply was published (or the message was fully handled); remove
    /// the delivery from the queue.
    Ack,
    /// The delivery cannot be processed; negative-acknowledge without
    /// requeue. Poison messages are dropped, not redelivered.
    Reject,
}

/// Everything one delivery needs, constructed once at startup and shared
/// across all delivery tasks. Replaces hidden process-wide state.
pub struct RouterContext {
    registry: HandlerRegistry,
    connector: Arc<dyn BackendConnector>,
    publisher: Arc<dyn ReplyPublisher>,
    cache: Arc<ResponseCache>,
    counters: Arc<dyn UsageRecorder>,
    /// Fallback reply destination for requests without a reply-to.
    reply_queue: String,
}

impl RouterContext {
    #[must_use]
    pub fn new(
        registry: HandlerRegistry,
        connector: Arc<dyn BackendConnector>,
        publisher: Arc<dyn ReplyPublisher>,
        cache: Arc<ResponseCache>,
        counters: Arc<dyn UsageRecorder>,
        reply_queue: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            connector,
            publisher,
            cache,
            counters,
            reply_queue: reply_queue.into(),
        }
    }

    /// Shared response cache, for external pollers.
    #[must_use]
    pub fn cache(&self) -> Arc<ResponseCache> {
        Arc::clone(&self.cache)
    }

    /// Runs the full pipeline for one delivery and returns its
    /// disposition. Infallible by design: every failure mode maps to a
    /// disposition instead of an error.
    pub async fn handle(&self, msg: InboundMessage) -> Disposition {
        let operation = msg.operation.clone().unwrap_or_default();
        let span = info_span!(
            "delivery",
            operation = %operation,
            correlation_id = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );
        self.handle_inner(msg).instrument(span).await
    }

    async fn handle_inner(&self, msg: InboundMessage) -> Disposition {
        let start = Instant::now();

        let Some(operation) = msg.operation else {
            warn!("delivery has no operation label, rejecting");
            return finish(start, Disposition::Reject);
        };
        // Receipt counts even when the body later fails to decode.
        self.counters.record_consumed(&operation);

        let decoded = match decode_request(&msg.body, msg.correlation_id.as_deref()) {
            Ok(decoded) => decoded,
            Err(e) => {
                // No valid correlation id to reply to; drop without requeue.
                warn!(error = %e, "request failed to decode, rejecting");
                return finish(start, Disposition::Reject);
            }
        };
        let ctx = decoded.context;
        tracing::Span::current().record("correlation_id", ctx.correlation_id.as_str());

        let body = match self.dispatch(&operation, decoded.payload, &ctx).await {
            Ok(body) => body,
            Err(ConnectorError::Unsupported(name)) => ReplyBody::Failure {
                code: NOT_IMPLEMENTED.to_string(),
                message: format!("operation {name} is not implemented"),
                messages: Vec::new(),
            },
            Err(ConnectorError::Internal(e)) => {
                error!(
                    correlation_id = %ctx.correlation_id,
                    error = %e,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "backend dispatch failed, dropping delivery"
                );
                return finish(start, Disposition::Reject);
            }
        };

        let reply = Reply::for_context(&ctx, body);
        let payload = match encode_reply(&reply) {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    correlation_id = %ctx.correlation_id,
                    error = %e,
                    "reply failed to serialize, dropping delivery"
                );
                return finish(start, Disposition::Reject);
            }
        };

        // Reply-to overrides the static fallback queue.
        let destination = msg.reply_to.as_deref().unwrap_or(&self.reply_queue);
        if let Err(e) = self
            .publisher
            .publish(
                destination,
                payload.clone(),
                Some(&operation),
                Some(&ctx.correlation_id),
            )
            .await
        {
            error!(
                correlation_id = %ctx.correlation_id,
                destination = destination,
                error = %e,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "reply publish failed, dropping delivery"
            );
            return finish(start, Disposition::Reject);
        }

        // Side effects run even when the reply went to a caller-supplied
        // reply-to destination.
        self.cache.put(ctx.correlation_id.clone(), payload);
        self.counters.record_published(&operation);

        info!(
            correlation_id = %ctx.correlation_id,
            destination = destination,
            error_code = reply.error_code(),
            "reply published"
        );
        finish(start, Disposition::Ack)
    }

    /// Reserved operations are served locally; everything else is
    /// forwarded verbatim to the backend connector.
    async fn dispatch(
        &self,
        operation: &str,
        payload: Map<String, Value>,
        ctx: &CallContext,
    ) -> Result<ReplyBody, ConnectorError> {
        if let Some(handler) = self.registry.get(operation) {
            return Ok(handler(payload, ctx.clone()).await);
        }
        self.connector.handle_operation(operation, payload, ctx).await
    }
}

impl std::fmt::Debug for RouterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterContext")
            .field("registry", &self.registry)
            .field("reply_queue", &self.reply_queue)
            .finish()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn finish(start: Instant, disposition: Disposition) -> Disposition {
    let span = tracing::Span::current();
    span.record("duration_ms", start.elapsed().as_millis() as u64);
    span.record(
        "outcome",
        match disposition {
            Disposition::Ack => "ack",
            Disposition::Reject => "reject",
        },
    );
    disposition
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
