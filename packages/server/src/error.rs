use corebridge_core::CodecError;

/// Error taxonomy for the relay pipeline.
///
/// Only `Transport` is fatal at the process level; everything else is
/// isolated to one delivery and must not terminate the consume loop.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Connection, channel, or publish failure. Fatal; not retried here.
    #[error("broker transport failure: {0}")]
    Transport(#[from] lapin::Error),
    /// Malformed or incomplete request JSON. The delivery is rejected
    /// without requeue and no reply is sent.
    #[error(transparent)]
    Parse(#[from] CodecError),
    /// Reply could not be serialized. Treated like a mid-pipeline failure.
    #[error("reply serialization failed: {0}")]
    Encode(#[from] serde_json::Error),
    /// The internal publisher task is gone; publishes can no longer
    /// complete. Surfaces during shutdown races.
    #[error("publisher task unavailable")]
    PublisherGone,
}
