//! Protocol error types
//!
//! Errors raised while marshaling or unmarshaling telemetry batches.

use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON encode or decode failed
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Protobuf encoding failed
    #[error("protobuf encode: {0}")]
    ProtoEncode(#[from] prost::EncodeError),

    /// Protobuf decoding failed
    #[error("protobuf decode: {0}")]
    ProtoDecode(#[from] prost::DecodeError),

    /// Input was empty where a document was expected
    #[error("empty data payload")]
    EmptyData,
}

impl ProtocolError {
    /// Whether the failure happened while decoding
    pub fn is_decode(&self) -> bool {
        match self {
            Self::Json(e) => e.is_data() || e.is_syntax() || e.is_eof(),
            Self::ProtoDecode(_) | Self::EmptyData => true,
            Self::ProtoEncode(_) => false,
        }
    }
}
