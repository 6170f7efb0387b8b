//! Wire envelope codec for broker-carried requests and replies.
//!
//! Requests arrive as JSON objects with a reserved
//! `outboundAdapterCallContext` field next to the operation-specific
//! fields. Decoding strips the reserved field, derives a [`CallContext`],
//! and hands the remaining fields onward as the operation payload.
//! Replies are the mirror transform: a `data` object (or `null`), an
//! echoed `inboundAdapterCallContext`, and a `status` block whose empty
//! `errorCode` string means success.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::CallContext;
use crate::error::CodecError;
use crate::reply::{DiagnosticMessage, Reply, ReplyBody};
use crate::UNKNOWN_CORRELATION_ID;

/// Reserved request field holding the caller's context.
pub const REQUEST_CONTEXT_FIELD: &str = "outboundAdapterCallContext";

/// Source label stamped on diagnostic messages the relay itself emits.
const RELAY_SOURCE: &str = "corebridge";

// ---------------------------------------------------------------------------
// Request wire types
// ---------------------------------------------------------------------------

/// One `{key, value}` entry of the wire general-context list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextEntry {
    pub key: String,
    pub value: String,
}

/// Nested authentication info inside the request call context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthInfo {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub username: Option<String>,
}

/// The reserved `outboundAdapterCallContext` request field, as on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundCallContext {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub consumer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub general_context: Option<Vec<ContextEntry>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub outbound_adapter_auth_info: Option<AuthInfo>,
}

impl OutboundCallContext {
    /// Derives the typed [`CallContext`], resolving the correlation id
    /// from the wire context first, then the transport property, then
    /// the `"unknown"` placeholder.
    #[must_use]
    pub fn into_call_context(self, transport_correlation_id: Option<&str>) -> CallContext {
        let auth = self.outbound_adapter_auth_info.unwrap_or_default();
        CallContext {
            correlation_id: self
                .correlation_id
                .or_else(|| transport_correlation_id.map(ToOwned::to_owned))
                .unwrap_or_else(|| UNKNOWN_CORRELATION_ID.to_string()),
            session_id: self.session_id,
            consumer_id: self.consumer_id,
            user_id: auth.user_id,
            username: auth.username,
            general_context: CallContext::flatten_entries(
                self.general_context
                    .unwrap_or_default()
                    .into_iter()
                    .map(|e| (e.key, e.value)),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Reply wire types
// ---------------------------------------------------------------------------

/// The reply-side call context, echoed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundCallContext {
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub general_context: Option<Vec<ContextEntry>>,
}

/// One diagnostic message in the reply status block, as on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendMessage {
    pub source: String,
    pub status: String,
    pub error_code: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration: Option<String>,
}

impl From<DiagnosticMessage> for BackendMessage {
    fn from(msg: DiagnosticMessage) -> Self {
        Self {
            source: msg.source,
            status: msg.status,
            error_code: msg.error_code,
            text: msg.text,
            duration: msg.duration,
        }
    }
}

/// Reply status block. An empty `errorCode` string means success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyStatus {
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub backend_messages: Option<Vec<BackendMessage>>,
}

/// The full reply envelope, as on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireReply {
    pub data: Value,
    pub inbound_adapter_call_context: InboundCallContext,
    pub status: ReplyStatus,
}

// ---------------------------------------------------------------------------
// Decode / encode
// ---------------------------------------------------------------------------

/// A successfully decoded request: the caller's context plus the
/// operation payload with the reserved context field removed.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRequest {
    pub context: CallContext,
    pub payload: Map<String, Value>,
}

/// Decodes a request body into its call context and operation payload.
///
/// `transport_correlation_id` is the broker-level correlation-id
/// property, used as a fallback when the wire context carries none.
///
/// # Errors
///
/// Returns a [`CodecError`] when the body is not valid JSON, not an
/// object, or has a missing/malformed `outboundAdapterCallContext`.
pub fn decode_request(
    body: &[u8],
    transport_correlation_id: Option<&str>,
) -> Result<DecodedRequest, CodecError> {
    let value: Value = serde_json::from_slice(body)?;
    let Value::Object(mut payload) = value else {
        return Err(CodecError::NotAnObject);
    };
    let raw = payload
        .remove(REQUEST_CONTEXT_FIELD)
        .ok_or(CodecError::MissingCallContext)?;
    let wire: OutboundCallContext =
        serde_json::from_value(raw).map_err(CodecError::InvalidCallContext)?;
    Ok(DecodedRequest {
        context: wire.into_call_context(transport_correlation_id),
        payload,
    })
}

/// Encodes a [`Reply`] into its wire JSON bytes.
///
/// Failures encode with `data: null` and the failure's human-readable
/// message prepended as a relay-sourced backend message, since the
/// status block itself only carries the error code.
///
/// # Errors
///
/// Returns the underlying `serde_json` error if serialization fails.
pub fn encode_reply(reply: &Reply) -> Result<Vec<u8>, serde_json::Error> {
    let (data, error_code, messages) = match &reply.body {
        ReplyBody::Success { data, messages } => {
            (Value::Object(data.clone()), String::new(), messages.clone())
        }
        ReplyBody::Failure {
            code,
            message,
            messages,
        } => {
            let mut all = Vec::with_capacity(messages.len() + 1);
            all.push(DiagnosticMessage {
                source: RELAY_SOURCE.to_string(),
                status: "error".to_string(),
                error_code: code.clone(),
                text: message.clone(),
                duration: None,
            });
            all.extend(messages.iter().cloned());
            (Value::Null, code.clone(), all)
        }
    };

    let backend_messages = if messages.is_empty() {
        None
    } else {
        Some(messages.into_iter().map(BackendMessage::from).collect())
    };

    serde_json::to_vec(&WireReply {
        data,
        inbound_adapter_call_context: InboundCallContext {
            correlation_id: reply.correlation_id.clone(),
            session_id: reply.session_id.clone(),
            general_context: None,
        },
        status: ReplyStatus {
            error_code,
            backend_messages,
        },
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn request_bytes(body: Value) -> Vec<u8> {
        serde_json::to_vec(&body).unwrap()
    }

    #[test]
    fn decode_full_request() {
        let body = request_bytes(json!({
            "outboundAdapterCallContext": {
                "correlationId": "abc-1",
                "sessionId": "s1",
                "consumerId": "app-7",
                "generalContext": [
                    {"key": "tenant", "value": "acme"},
                    {"key": "channel", "value": "web"}
                ],
                "outboundAdapterAuthInfo": {"userId": "u-9", "username": "alice"}
            },
            "accountId": "acct-1",
            "amount": 100
        }));

        let decoded = decode_request(&body, None).unwrap();
        assert_eq!(decoded.context.correlation_id, "abc-1");
        assert_eq!(decoded.context.session_id.as_deref(), Some("s1"));
        assert_eq!(decoded.context.consumer_id.as_deref(), Some("app-7"));
        assert_eq!(decoded.context.user_id.as_deref(), Some("u-9"));
        assert_eq!(decoded.context.username.as_deref(), Some("alice"));
        assert_eq!(decoded.context.general_context["tenant"], "acme");
        assert_eq!(decoded.context.general_context["channel"], "web");

        // Reserved field is stripped; operation fields remain.
        assert!(!decoded.payload.contains_key(REQUEST_CONTEXT_FIELD));
        assert_eq!(decoded.payload["accountId"], json!("acct-1"));
        assert_eq!(decoded.payload["amount"], json!(100));
    }

    #[test]
    fn decode_minimal_request() {
        let body = request_bytes(json!({
            "outboundAdapterCallContext": {"correlationId": "c-2"}
        }));
        let decoded = decode_request(&body, None).unwrap();
        assert_eq!(decoded.context.correlation_id, "c-2");
        assert!(decoded.context.session_id.is_none());
        assert!(decoded.context.general_context.is_empty());
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn decode_falls_back_to_transport_correlation_id() {
        let body = request_bytes(json!({
            "outboundAdapterCallContext": {"sessionId": "s1"}
        }));
        let decoded = decode_request(&body, Some("prop-id")).unwrap();
        assert_eq!(decoded.context.correlation_id, "prop-id");
    }

    #[test]
    fn decode_without_any_correlation_id_uses_unknown() {
        let body = request_bytes(json!({
            "outboundAdapterCallContext": {}
        }));
        let decoded = decode_request(&body, None).unwrap();
        assert_eq!(decoded.context.correlation_id, "unknown");
    }

    #[test]
    fn decode_malformed_json_is_parse_error() {
        let err = decode_request(b"{not json", None).unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
    }

    #[test]
    fn decode_non_object_body_rejected() {
        let err = decode_request(b"[1, 2, 3]", None).unwrap_err();
        assert!(matches!(err, CodecError::NotAnObject));
    }

    #[test]
    fn decode_missing_call_context_rejected() {
        let body = request_bytes(json!({"accountId": "acct-1"}));
        let err = decode_request(&body, None).unwrap_err();
        assert!(matches!(err, CodecError::MissingCallContext));
    }

    #[test]
    fn decode_invalid_call_context_rejected() {
        let body = request_bytes(json!({"outboundAdapterCallContext": "not-an-object"}));
        let err = decode_request(&body, None).unwrap_err();
        assert!(matches!(err, CodecError::InvalidCallContext(_)));
    }

    #[test]
    fn decode_duplicate_general_context_keys_last_write_wins() {
        let body = request_bytes(json!({
            "outboundAdapterCallContext": {
                "correlationId": "c-3",
                "generalContext": [
                    {"key": "env", "value": "stage"},
                    {"key": "env", "value": "prod"}
                ]
            }
        }));
        let decoded = decode_request(&body, None).unwrap();
        assert_eq!(decoded.context.general_context.len(), 1);
        assert_eq!(decoded.context.general_context["env"], "prod");
    }

    #[test]
    fn encode_success_reply_shape() {
        // Scenario: getAdapterInfo reply for {"correlationId":"abc-1","sessionId":"s1"}.
        let ctx = CallContext {
            correlation_id: "abc-1".to_string(),
            session_id: Some("s1".to_string()),
            consumer_id: None,
            user_id: None,
            username: None,
            general_context: HashMap::new(),
        };
        let mut data = Map::new();
        data.insert("name".to_string(), json!("corebridge"));
        data.insert("version".to_string(), json!("0.1.0"));

        let bytes = encode_reply(&Reply::success(&ctx, data)).unwrap();
        let wire: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(wire["data"]["name"], json!("corebridge"));
        assert_eq!(wire["data"]["version"], json!("0.1.0"));
        assert_eq!(wire["status"]["errorCode"], json!(""));
        assert_eq!(wire["inboundAdapterCallContext"]["correlationId"], json!("abc-1"));
        assert_eq!(wire["inboundAdapterCallContext"]["sessionId"], json!("s1"));
    }

    #[test]
    fn encode_failure_reply_shape() {
        // Scenario: unknownOp reply carries NOT_IMPLEMENTED and null data.
        let ctx = CallContext {
            correlation_id: "abc-2".to_string(),
            session_id: None,
            consumer_id: None,
            user_id: None,
            username: None,
            general_context: HashMap::new(),
        };
        let bytes = encode_reply(&Reply::failure(&ctx, "NOT_IMPLEMENTED", "unknownOp")).unwrap();
        let wire: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(wire["data"], Value::Null);
        assert_eq!(wire["status"]["errorCode"], json!("NOT_IMPLEMENTED"));
        assert_eq!(wire["inboundAdapterCallContext"]["correlationId"], json!("abc-2"));

        let messages = wire["status"]["backendMessages"].as_array().unwrap();
        assert_eq!(messages[0]["source"], json!("corebridge"));
        assert_eq!(messages[0]["errorCode"], json!("NOT_IMPLEMENTED"));
        assert_eq!(messages[0]["text"], json!("unknownOp"));
    }

    #[test]
    fn encode_success_with_diagnostics() {
        let ctx = CallContext {
            correlation_id: "abc-3".to_string(),
            session_id: None,
            consumer_id: None,
            user_id: None,
            username: None,
            general_context: HashMap::new(),
        };
        let reply = Reply::for_context(
            &ctx,
            ReplyBody::Success {
                data: Map::new(),
                messages: vec![DiagnosticMessage {
                    source: "backend".to_string(),
                    status: "ok".to_string(),
                    error_code: String::new(),
                    text: "fetched".to_string(),
                    duration: Some("12ms".to_string()),
                }],
            },
        );
        let bytes = encode_reply(&reply).unwrap();
        let wire: Value = serde_json::from_slice(&bytes).unwrap();

        let messages = wire["status"]["backendMessages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["source"], json!("backend"));
        assert_eq!(messages[0]["duration"], json!("12ms"));
    }

    #[test]
    fn encode_success_without_diagnostics_omits_backend_messages() {
        let ctx = CallContext {
            correlation_id: "abc-4".to_string(),
            session_id: None,
            consumer_id: None,
            user_id: None,
            username: None,
            general_context: HashMap::new(),
        };
        let bytes = encode_reply(&Reply::success(&ctx, Map::new())).unwrap();
        let wire: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(wire["status"].get("backendMessages").is_none());
    }

    proptest! {
        /// Decoding a general-context entry list yields exactly the mapping
        /// produced by last-write-wins insertion, independent of list order
        /// beyond that rule.
        #[test]
        fn general_context_roundtrip(entries in proptest::collection::vec(
            ("[a-z]{1,8}", "[a-zA-Z0-9]{0,12}"),
            0..16,
        )) {
            let list: Vec<Value> = entries
                .iter()
                .map(|(k, v)| json!({"key": k, "value": v}))
                .collect();
            let body = serde_json::to_vec(&json!({
                "outboundAdapterCallContext": {
                    "correlationId": "p-1",
                    "generalContext": list
                }
            })).unwrap();

            let mut expected = HashMap::new();
            for (k, v) in &entries {
                expected.insert(k.clone(), v.clone());
            }

            let decoded = decode_request(&body, None).unwrap();
            prop_assert_eq!(decoded.context.general_context, expected);
        }
    }
}
