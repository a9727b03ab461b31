//! Spool Protocol - telemetry types handed to the file exporter
//!
//! This crate provides the data that flows into the exporter:
//! - `TelemetryBatch` - one signal's records grouped by resource
//! - `ResourceTelemetry` - the routing unit (resource attributes + records)
//! - `Marshaler` - the `json` and `proto` wire encodings
//!
//! The exporter treats records as opaque apart from reading, and optionally
//! stripping, one resource attribute before handing the batch to a marshaler.

mod error;
mod marshal;
mod telemetry;

pub use error::ProtocolError;
pub use marshal::{JsonMarshaler, Marshaler, ProtoMarshaler};
pub use telemetry::{
    AnyValue, KeyValue, Resource, ResourceTelemetry, Signal, TelemetryBatch, TelemetryRecord,
    any_value,
};

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod telemetry_test;
