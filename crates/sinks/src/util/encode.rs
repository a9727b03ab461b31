//! Encode/compress pipeline
//!
//! Turns one group of resource telemetry into a self-contained write unit:
//!
//! ```text
//! TelemetryBatch → marshal (json | proto) → compress (none | zstd) → frame → bytes
//! ```
//!
//! Every unit is compressed on its own as one zstd frame, so a file cut at
//! any unit boundary (rotation, crash, eviction) can be read back without
//! the rest of the stream.
//!
//! # Framing
//!
//! | Format | Compression | On disk |
//! |--------|-------------|---------|
//! | json   | none        | one JSON document per line |
//! | json   | zstd        | `[u32 BE length][zstd frame]` |
//! | proto  | any         | `[u32 BE length][payload]` |

use std::io::{self, BufRead, Read};
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use spool_config::{Compression, FileExporterConfig, Format};
use spool_protocol::{JsonMarshaler, Marshaler, ProtoMarshaler, TelemetryBatch};

use crate::common::{Result, SinkError};
use crate::util::buffer_pool::BufferPool;

/// Size of the length prefix on framed units
pub const LENGTH_FIELD_SIZE: usize = 4;

const ZSTD_LEVEL: i32 = 3;

/// Upfront buffer for one frame; larger frames grow as they are read
const MAX_PREALLOCATION: usize = 64 * 1024;

/// How units are delimited inside a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Newline after each unit
    Lines,
    /// Big-endian `u32` length before each unit
    LengthPrefixed,
}

impl Framing {
    pub fn for_output(format: Format, compression: Compression) -> Self {
        match (format, compression) {
            (Format::Json, Compression::None) => Self::Lines,
            _ => Self::LengthPrefixed,
        }
    }
}

fn marshaler_for(format: Format) -> Arc<dyn Marshaler> {
    match format {
        Format::Json => Arc::new(JsonMarshaler),
        Format::Proto => Arc::new(ProtoMarshaler),
    }
}

/// Builds write units for one exporter
pub struct EncodePipeline {
    marshaler: Arc<dyn Marshaler>,
    compression: Compression,
    framing: Framing,
    buffers: BufferPool,
}

impl EncodePipeline {
    pub fn new(format: Format, compression: Compression) -> Self {
        Self {
            marshaler: marshaler_for(format),
            compression,
            framing: Framing::for_output(format, compression),
            buffers: BufferPool::default(),
        }
    }

    pub fn from_config(config: &FileExporterConfig) -> Self {
        Self::new(config.format, config.compression)
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Marshal a batch with the configured format
    pub fn encode(&self, batch: &TelemetryBatch) -> Result<Bytes> {
        let mut scratch = self.buffers.get();
        let result = self.marshaler.marshal(batch, &mut scratch);
        let encoded = result.map(|()| Bytes::copy_from_slice(&scratch));
        self.buffers.put(scratch);
        Ok(encoded?)
    }

    /// Compress with the configured codec, identity when disabled
    pub fn compress(&self, data: &[u8]) -> Result<Bytes> {
        compress(self.compression, data)
    }

    /// Marshal, compress, and frame one unit
    pub fn encode_unit(&self, batch: &TelemetryBatch) -> Result<Bytes> {
        let mut scratch = self.buffers.get();
        let unit = self.build_unit(batch, &mut scratch);
        self.buffers.put(scratch);
        unit
    }

    fn build_unit(&self, batch: &TelemetryBatch, scratch: &mut BytesMut) -> Result<Bytes> {
        self.marshaler.marshal(batch, scratch)?;

        let payload = match self.compression {
            Compression::None => None,
            Compression::Zstd => Some(compress(self.compression, &scratch[..])?),
        };
        let payload: &[u8] = payload.as_deref().unwrap_or(&scratch[..]);

        let mut out = BytesMut::with_capacity(payload.len() + LENGTH_FIELD_SIZE);
        match self.framing {
            Framing::Lines => {
                out.put_slice(payload);
                out.put_u8(b'\n');
            }
            Framing::LengthPrefixed => {
                let len = u32::try_from(payload.len()).map_err(|_| {
                    SinkError::encoding(format!("unit of {} bytes exceeds frame limit", payload.len()))
                })?;
                out.put_u32(len);
                out.put_slice(payload);
            }
        }
        Ok(out.freeze())
    }

    /// Reader for files this pipeline produced
    pub fn reader<R: BufRead>(&self, reader: R) -> FrameReader<R> {
        FrameReader {
            reader,
            framing: self.framing,
            compression: self.compression,
            marshaler: Arc::clone(&self.marshaler),
        }
    }
}

/// Compress one unit
pub fn compress(compression: Compression, data: &[u8]) -> Result<Bytes> {
    match compression {
        Compression::None => Ok(Bytes::copy_from_slice(data)),
        Compression::Zstd => zstd::encode_all(data, ZSTD_LEVEL)
            .map(Bytes::from)
            .map_err(|e| SinkError::encoding(format!("zstd compress: {e}"))),
    }
}

/// Reverse of [`compress`]
pub fn decompress(compression: Compression, data: &[u8]) -> Result<Bytes> {
    match compression {
        Compression::None => Ok(Bytes::copy_from_slice(data)),
        Compression::Zstd => zstd::decode_all(data)
            .map(Bytes::from)
            .map_err(|e| SinkError::encoding(format!("zstd decompress: {e}"))),
    }
}

/// Reads write units back out of an exporter file
pub struct FrameReader<R> {
    reader: R,
    framing: Framing,
    compression: Compression,
    marshaler: Arc<dyn Marshaler>,
}

impl<R: BufRead> FrameReader<R> {
    /// Next unit's decompressed payload, `None` at end of file
    pub fn read_unit(&mut self) -> Result<Option<Bytes>> {
        let raw = match self.framing {
            Framing::Lines => self.read_line(),
            Framing::LengthPrefixed => self.read_frame(),
        }
        .map_err(|e| SinkError::encoding(format!("read unit: {e}")))?;

        match raw {
            Some(raw) => decompress(self.compression, &raw).map(Some),
            None => Ok(None),
        }
    }

    /// Next unit decoded into a batch
    pub fn read_batch(&mut self) -> Result<Option<TelemetryBatch>> {
        match self.read_unit()? {
            Some(payload) => Ok(Some(self.marshaler.unmarshal(&payload)?)),
            None => Ok(None),
        }
    }

    /// Every remaining batch
    pub fn read_all(&mut self) -> Result<Vec<TelemetryBatch>> {
        let mut batches = Vec::new();
        while let Some(batch) = self.read_batch()? {
            batches.push(batch);
        }
        Ok(batches)
    }

    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            let mut line = Vec::new();
            if self.reader.read_until(b'\n', &mut line)? == 0 {
                return Ok(None);
            }
            if line.last() == Some(&b'\n') {
                line.pop();
            }
            if !line.is_empty() {
                return Ok(Some(line));
            }
        }
    }

    fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut len_bytes = [0u8; LENGTH_FIELD_SIZE];
        let mut filled = 0;
        while filled < LENGTH_FIELD_SIZE {
            match self.reader.read(&mut len_bytes[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        match filled {
            0 => return Ok(None),
            LENGTH_FIELD_SIZE => {}
            n => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("torn length header: {n} of {LENGTH_FIELD_SIZE} bytes"),
                ));
            }
        }

        // The header is untrusted; grow with the bytes actually present.
        let len = u32::from_be_bytes(len_bytes) as usize;
        let mut data = Vec::with_capacity(len.min(MAX_PREALLOCATION));
        Read::take(&mut self.reader, len as u64).read_to_end(&mut data)?;
        if data.len() < len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("torn unit: {} of {len} bytes", data.len()),
            ));
        }
        Ok(Some(data))
    }
}

#[cfg(test)]
#[path = "encode_test.rs"]
mod encode_test;
