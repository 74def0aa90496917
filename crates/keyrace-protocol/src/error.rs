//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding wire messages.
///
/// A decode failure here means the outer envelope itself could not be
/// parsed. Field-level problems inside a payload never surface as a
/// `ProtocolError`; they are reported as [`FieldIssue`](crate::FieldIssue)s.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, a non-object frame, or an
    /// envelope field of the wrong type.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The bytes are not valid UTF-8 text.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
