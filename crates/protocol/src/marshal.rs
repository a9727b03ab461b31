//! Wire marshalers
//!
//! Two fixed encodings of a `TelemetryBatch`:
//!
//! - `JsonMarshaler`: one JSON document per batch (serde_json)
//! - `ProtoMarshaler`: protobuf binary (prost)
//!
//! Both append into a caller-supplied `BytesMut` so buffers can be pooled.

use bytes::{BufMut, BytesMut};
use prost::Message;

use crate::error::ProtocolError;
use crate::telemetry::TelemetryBatch;
use crate::Result;

/// Encoding strategy for telemetry batches
pub trait Marshaler: Send + Sync {
    /// Append the encoded batch to `buf`
    fn marshal(&self, batch: &TelemetryBatch, buf: &mut BytesMut) -> Result<()>;

    /// Decode one batch previously produced by `marshal`
    fn unmarshal(&self, data: &[u8]) -> Result<TelemetryBatch>;

    /// Format name as it appears in configuration
    fn name(&self) -> &'static str;
}

/// JSON marshaler
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMarshaler;

impl Marshaler for JsonMarshaler {
    fn marshal(&self, batch: &TelemetryBatch, buf: &mut BytesMut) -> Result<()> {
        serde_json::to_writer(buf.writer(), batch)?;
        Ok(())
    }

    fn unmarshal(&self, data: &[u8]) -> Result<TelemetryBatch> {
        if data.is_empty() {
            return Err(ProtocolError::EmptyData);
        }
        Ok(serde_json::from_slice(data)?)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// Protobuf marshaler
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtoMarshaler;

impl Marshaler for ProtoMarshaler {
    fn marshal(&self, batch: &TelemetryBatch, buf: &mut BytesMut) -> Result<()> {
        buf.reserve(batch.encoded_len());
        batch.encode(buf)?;
        Ok(())
    }

    fn unmarshal(&self, data: &[u8]) -> Result<TelemetryBatch> {
        Ok(TelemetryBatch::decode(data)?)
    }

    fn name(&self) -> &'static str {
        "proto"
    }
}
