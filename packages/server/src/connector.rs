//! Backend connector seam.
//!
//! The connector performs the actual business operation behind an
//! operation name. Its internals (REST/SOAP calls, retries against a
//! real banking system) live outside this crate; the relay only depends
//! on this trait.

use async_trait::async_trait;
use corebridge_core::{CallContext, ReplyBody};
use serde_json::{Map, Value};

/// Errors a connector can report back to the router.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// The connector has no implementation for this operation name.
    /// Surfaced to the caller as a `NOT_IMPLEMENTED` reply.
    #[error("operation not supported by backend: {0}")]
    Unsupported(String),
    /// Unexpected connector failure. Treated as a mid-pipeline failure:
    /// logged and the delivery is dropped without a reply.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Pluggable capability that executes operations against the backend.
///
/// A connector-reported business failure is a *successful* dispatch
/// carrying [`ReplyBody::Failure`]; `Err` is reserved for the cases
/// above.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    /// Execute `operation` with its payload (call context already
    /// stripped) on behalf of the given caller.
    async fn handle_operation(
        &self,
        operation: &str,
        payload: Map<String, Value>,
        ctx: &CallContext,
    ) -> Result<ReplyBody, ConnectorError>;

    /// Probe backend connectivity.
    async fn check_health(&self, ctx: &CallContext) -> Result<ReplyBody, ConnectorError>;
}

/// Connector with no backend attached: every operation is unsupported.
///
/// Used when the relay runs standalone; the reserved operations still
/// work and everything else answers `NOT_IMPLEMENTED`.
#[derive(Debug, Default)]
pub struct NullConnector;

#[async_trait]
impl BackendConnector for NullConnector {
    async fn handle_operation(
        &self,
        operation: &str,
        _payload: Map<String, Value>,
        _ctx: &CallContext,
    ) -> Result<ReplyBody, ConnectorError> {
        Err(ConnectorError::Unsupported(operation.to_string()))
    }

    async fn check_health(&self, _ctx: &CallContext) -> Result<ReplyBody, ConnectorError> {
        let mut data = Map::new();
        data.insert("backend".to_string(), Value::String("none".to_string()));
        Ok(ReplyBody::Success {
            data,
            messages: Vec::new(),
        })
    }
}
