//! Codec trait and the JSON implementation.
//!
//! The transport hands us raw bytes; a codec turns them into
//! [`GameMessage`](crate::GameMessage) values and back. Keeping this
//! behind a trait means a binary codec can replace JSON later without
//! touching the peers.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts between values and wire bytes.
///
/// `Send + Sync + 'static` because the codec is owned by long-lived
/// async tasks that may hop threads.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if the value cannot be
    /// represented in this format.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed,
    /// truncated, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// Human-readable, which matters here: the peers are typically
/// browsers, and payloads show up verbatim in DevTools. Behind the
/// `json` feature (enabled by default).
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{GameMessage, PlayerId};

    #[test]
    fn test_json_codec_round_trips_a_message() {
        let codec = JsonCodec;
        let msg = GameMessage::CallNumber {
            player_id: PlayerId(9),
            number: 4,
        };

        let bytes = codec.encode(&msg).unwrap();
        let decoded: GameMessage = codec.decode(&bytes).unwrap();

        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_json_codec_decode_garbage_errors() {
        let codec = JsonCodec;
        let result: Result<GameMessage, _> = codec.decode(b"not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
