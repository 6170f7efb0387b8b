use serde_json::Map;

use crate::context::CallContext;

/// Informational message attached to a reply by the backend or the relay.
/// Never affects control flow.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiagnosticMessage {
    pub source: String,
    pub status: String,
    pub error_code: String,
    pub text: String,
    pub duration: Option<String>,
}

/// Outcome of one dispatched operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    /// The operation succeeded; `data` becomes the wire reply's `data` object.
    Success {
        data: Map<String, serde_json::Value>,
        messages: Vec<DiagnosticMessage>,
    },
    /// The operation failed; `data` is `null` on the wire and `code` becomes
    /// the status block's `errorCode`.
    Failure {
        code: String,
        message: String,
        messages: Vec<DiagnosticMessage>,
    },
}

/// A correlated reply, ready to be encoded and published.
/// Always carries the originating request's correlation and session ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub correlation_id: String,
    pub session_id: Option<String>,
    pub body: ReplyBody,
}

impl Reply {
    /// Builds a reply correlated to the given call context.
    #[must_use]
    pub fn for_context(ctx: &CallContext, body: ReplyBody) -> Self {
        Self {
            correlation_id: ctx.correlation_id.clone(),
            session_id: ctx.session_id.clone(),
            body,
        }
    }

    /// Builds a successful reply with no diagnostic messages.
    #[must_use]
    pub fn success(ctx: &CallContext, data: Map<String, serde_json::Value>) -> Self {
        Self::for_context(
            ctx,
            ReplyBody::Success {
                data,
                messages: Vec::new(),
            },
        )
    }

    /// Builds a failure reply with no diagnostic messages.
    #[must_use]
    pub fn failure(ctx: &CallContext, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::for_context(
            ctx,
            ReplyBody::Failure {
                code: code.into(),
                message: message.into(),
                messages: Vec::new(),
            },
        )
    }

    /// Returns the status error code: empty string for success.
    #[must_use]
    pub fn error_code(&self) -> &str {
        match &self.body {
            ReplyBody::Success { .. } => "",
            ReplyBody::Failure { code, .. } => code,
        }
    }

    /// Whether this reply reports a successful operation.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.body, ReplyBody::Success { .. })
    }
}
