/// Errors from decoding a request envelope.
///
/// Decode failures are a distinct class from backend failures: the router
/// rejects the delivery without producing a reply, whereas backend
/// failures still yield a correlated error reply.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("request body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("request body is not a JSON object")]
    NotAnObject,
    #[error("request body has no outboundAdapterCallContext field")]
    MissingCallContext,
    #[error("outboundAdapterCallContext is malformed: {0}")]
    InvalidCallContext(serde_json::Error),
}
