//! Spool - Sinks
//!
//! Durable, file-based sink for telemetry batches.
//!
//! # Architecture
//!
//! The exporter resolves a destination file for every resource group,
//! encodes each destination's share of a batch as one write unit, and
//! writes it through a bounded pool of open files that rotate by size.
//!
//! ```text
//! [Pipeline] --TelemetryBatch--> [FileExporter] --unit--> [HandlePool] --> [RotatingFile] --> [Disk]
//!                                                              ↑
//!                                                      [FlushScheduler]
//! ```
//!
//! # Guarantees
//!
//! - Writes to one destination are serialized by a per-path lock; units are
//!   never interleaved
//! - At most `max_open_files` files are open at any time
//! - A record lands in exactly one file, or is discarded, or is reported failed
//! - Shutdown flushes and syncs every open file, or reports which failed
//!
//! # Example
//!
//! ```ignore
//! use spool_config::{FileExporterConfig, RotationConfig};
//! use spool_sinks::FileExporter;
//!
//! let config = FileExporterConfig::new("/var/spool/otel/log")
//!     .with_rotation(RotationConfig::default());
//! let exporter = FileExporter::new(config)?;
//! exporter.start();
//!
//! let outcome = exporter.export(batch);
//! exporter.shutdown().await?;
//! ```

/// File exporter facade, path resolution, and export outcomes
pub mod exporter;

/// Rotation, handle pool, encoding, and flush scheduling
pub mod util;

/// Errors and metrics shared by all components
mod common;

pub use common::{ErrorKind, ExporterMetrics, MetricsSnapshot, Result, SinkError};
pub use exporter::{ExportOutcome, ExportStatus, FileExporter, PathDecision, PathFailure, PathResolver};
