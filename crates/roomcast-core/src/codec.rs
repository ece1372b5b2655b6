use bytes::Bytes;

use crate::envelope::Envelope;

/// Failure to encode or decode a wire envelope.
#[derive(Clone, Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}

/// Wire framing boundary.
///
/// The owning connection framework may supply its own framing; the default
/// is plain JSON.
pub trait Codec: Send + Sync {
    fn encode(&self, envelope: &Envelope) -> Result<Bytes, CodecError>;
    fn decode(&self, payload: &[u8]) -> Result<Envelope, CodecError>;
}

/// JSON framing.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, envelope: &Envelope) -> Result<Bytes, CodecError> {
        serde_json::to_vec(envelope)
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, payload: &[u8]) -> Result<Envelope, CodecError> {
        serde_json::from_slice(payload).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
