//! Error type for the protocol layer.
//!
//! A `ProtocolError` always means "this payload never becomes a message":
//! either the bytes didn't decode, or the decoded values violate a domain
//! rule. Callers drop the payload and log — protocol failures are never
//! allowed to crash a peer or reach the session logic.

/// Errors produced while decoding or validating wire data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (a value could not be turned into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, an
    /// unknown `type` tag, or mismatched field types.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but violates a domain rule — a number outside
    /// 1..=25, an empty name, an internally inconsistent snapshot.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
