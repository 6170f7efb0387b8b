//! Corebridge Core — wire envelope codec, call context, and reply model.

pub mod context;
pub mod envelope;
pub mod error;
pub mod reply;

pub use context::CallContext;
pub use envelope::{decode_request, encode_reply, DecodedRequest};
pub use error::CodecError;
pub use reply::{DiagnosticMessage, Reply, ReplyBody};

/// Error code emitted when an operation has neither a local handler nor
/// connector support.
pub const NOT_IMPLEMENTED: &str = "NOT_IMPLEMENTED";

/// Correlation id substituted when a request carries none at all.
pub const UNKNOWN_CORRELATION_ID: &str = "unknown";
