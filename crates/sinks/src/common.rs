//! Common types for the file exporter
//!
//! Errors, error classification, and the shared metrics block.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use spool_config::ConfigError;
use spool_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sink operations
pub type Result<T> = std::result::Result<T, SinkError>;

/// Metrics shared by the exporter, the handle pool, and the flush scheduler
#[derive(Debug, Default)]
pub struct ExporterMetrics {
    /// Total batches handed to `export`
    pub batches_received: AtomicU64,

    /// Records persisted to a destination file
    pub records_written: AtomicU64,

    /// Records dropped because the routing attribute was missing
    pub records_discarded: AtomicU64,

    /// Records that could not be resolved, encoded, or written
    pub records_failed: AtomicU64,

    /// Total bytes written (after framing and compression)
    pub bytes_written: AtomicU64,

    /// Write, flush, and close errors encountered
    pub write_errors: AtomicU64,

    /// Per-file flushes performed
    pub flush_count: AtomicU64,

    /// Size-triggered rotations
    pub rotations: AtomicU64,

    /// Files opened by the handle pool (including reopens after eviction)
    pub files_opened: AtomicU64,

    /// Entries evicted to stay within the open file cap
    pub evictions: AtomicU64,

    /// Files currently open
    pub open_files: AtomicU64,

    /// Highest value `open_files` has reached
    pub peak_open_files: AtomicU64,
}

impl ExporterMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            batches_received: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            records_discarded: AtomicU64::new(0),
            records_failed: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            flush_count: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
            files_opened: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            open_files: AtomicU64::new(0),
            peak_open_files: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn batch_received(&self) {
        self.batches_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successfully written group
    #[inline]
    pub fn records_written(&self, records: u64, bytes: u64) {
        self.records_written.fetch_add(records, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn records_discarded(&self, records: u64) {
        self.records_discarded.fetch_add(records, Ordering::Relaxed);
    }

    #[inline]
    pub fn records_failed(&self, records: u64) {
        self.records_failed.fetch_add(records, Ordering::Relaxed);
    }

    #[inline]
    pub fn write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn flush(&self) {
        self.flush_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a newly opened file and update the peak
    #[inline]
    pub fn file_opened(&self) {
        self.files_opened.fetch_add(1, Ordering::Relaxed);
        let open = self.open_files.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_open_files.fetch_max(open, Ordering::Relaxed);
    }

    #[inline]
    pub fn file_closed(&self) {
        self.open_files.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_received: self.batches_received.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            records_discarded: self.records_discarded.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            flush_count: self.flush_count.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            files_opened: self.files_opened.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            open_files: self.open_files.load(Ordering::Relaxed),
            peak_open_files: self.peak_open_files.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of exporter metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub batches_received: u64,
    pub records_written: u64,
    pub records_discarded: u64,
    pub records_failed: u64,
    pub bytes_written: u64,
    pub write_errors: u64,
    pub flush_count: u64,
    pub rotations: u64,
    pub files_opened: u64,
    pub evictions: u64,
    pub open_files: u64,
    pub peak_open_files: u64,
}

/// Coarse classification of a `SinkError`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid configuration, fatal before startup
    Config,
    /// Destination could not be opened or is not allowed
    Resource,
    /// Backup rename or delete failed
    Rotation,
    /// Serialization or compression failed
    Encoding,
    /// Write, flush, or close failed
    Io,
    /// Pool closed or handle evicted
    Closed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Resource => "resource",
            Self::Rotation => "rotation",
            Self::Encoding => "encoding",
            Self::Io => "io",
            Self::Closed => "closed",
        }
    }
}

/// File exporter errors
#[derive(Debug, Error)]
pub enum SinkError {
    /// Configuration rejected
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Opening a destination (or creating its directory) failed
    #[error("failed to open '{}': {source}", path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Parent directory is absent and auto-create is disabled
    #[error("directory '{}' does not exist and auto-create is disabled", dir.display())]
    MissingDirectory { dir: PathBuf },

    /// Routing attribute names a file the exporter must not write
    #[error("sub path '{value}' {reason}")]
    InvalidSubPath {
        path: PathBuf,
        value: String,
        reason: &'static str,
    },

    /// Failed to write data
    #[error("write to '{}' failed: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to flush or close
    #[error("flush of '{}' failed: {source}", path.display())]
    Flush {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Backup rename or delete failed
    #[error("rotation of '{}' failed: {source}", path.display())]
    Rotation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Serialization or compression error
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// The handle was closed by eviction before the write could run
    #[error("handle for '{}' was evicted", path.display())]
    Evicted { path: PathBuf },

    /// The pool has been shut down
    #[error("handle pool is closed")]
    PoolClosed,

    /// One or more files failed to flush or close during shutdown
    #[error("shutdown failed for {failures} file(s): {first}")]
    Shutdown { failures: usize, first: String },
}

impl SinkError {
    pub fn resource(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Resource {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn write(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Write {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn flush(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Flush {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn rotation(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Rotation {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    pub fn evicted(path: impl AsRef<Path>) -> Self {
        Self::Evicted {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Resource { .. } | Self::MissingDirectory { .. } | Self::InvalidSubPath { .. } => {
                ErrorKind::Resource
            }
            Self::Rotation { .. } => ErrorKind::Rotation,
            Self::Encoding(_) => ErrorKind::Encoding,
            Self::Write { .. } | Self::Flush { .. } | Self::Shutdown { .. } => ErrorKind::Io,
            Self::Evicted { .. } | Self::PoolClosed => ErrorKind::Closed,
        }
    }
}

impl From<ProtocolError> for SinkError {
    fn from(e: ProtocolError) -> Self {
        Self::Encoding(e.to_string())
    }
}

#[cfg(test)]
#[path = "common_test.rs"]
mod common_test;
