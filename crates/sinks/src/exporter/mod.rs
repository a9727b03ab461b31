//! File exporter
//!
//! Entry point for the upstream pipeline. For each batch:
//!
//! ```text
//! resources → PathResolver → group by path (arrival order) → EncodePipeline
//!           → HandlePool::write → RotatingFile
//! ```
//!
//! Each destination receives one write unit per batch. Failures are isolated
//! per destination and reported in the returned [`ExportOutcome`]; nothing
//! is retried here.
//!
//! # Example
//!
//! ```ignore
//! let config = FileExporterConfig::new("/var/spool/otel/log");
//! let exporter = FileExporter::new(config)?;
//! exporter.start();
//!
//! let outcome = exporter.export(batch);
//! if !outcome.is_success() {
//!     tracing::warn!(failed = outcome.failed, "partial export");
//! }
//!
//! exporter.shutdown().await?;
//! ```

mod outcome;
mod resolve;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use spool_config::FileExporterConfig;
use spool_protocol::{ResourceTelemetry, TelemetryBatch};

use crate::common::{ExporterMetrics, MetricsSnapshot, Result, SinkError};
use crate::util::encode::EncodePipeline;
use crate::util::flush_scheduler::FlushScheduler;
use crate::util::handle_pool::{HandlePool, PoolOptions};
use crate::util::rate_limited_logger::RateLimitedLogger;

pub use outcome::{ExportOutcome, ExportStatus, PathFailure};
pub use resolve::{PathDecision, PathResolver};

/// Durable, file-based telemetry exporter
pub struct FileExporter {
    config: FileExporterConfig,
    resolver: PathResolver,
    pipeline: EncodePipeline,
    pool: Arc<HandlePool>,
    metrics: Arc<ExporterMetrics>,
    logger: Arc<RateLimitedLogger>,
    scheduler: Mutex<Option<FlushScheduler>>,
}

impl FileExporter {
    /// Build an exporter from validated configuration
    ///
    /// Does not touch the filesystem; files open on first write.
    pub fn new(config: FileExporterConfig) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(ExporterMetrics::new());
        let logger = Arc::new(RateLimitedLogger::default());
        let pool = HandlePool::new(
            PoolOptions::from_config(&config),
            Arc::clone(&metrics),
            Arc::clone(&logger),
        );

        Ok(Self {
            resolver: PathResolver::from_config(&config),
            pipeline: EncodePipeline::from_config(&config),
            pool: Arc::new(pool),
            metrics,
            logger,
            scheduler: Mutex::new(None),
            config,
        })
    }

    /// Start the periodic flush task
    ///
    /// Must be called from within a Tokio runtime. Calling it again while
    /// running does nothing.
    pub fn start(&self) {
        let mut scheduler = self.scheduler.lock();
        if scheduler.is_some() {
            return;
        }
        *scheduler = Some(FlushScheduler::spawn(
            Arc::clone(&self.pool),
            self.config.effective_flush_interval(),
        ));

        tracing::info!(
            path = %self.config.path,
            format = self.config.format.as_str(),
            compression = self.config.compression.as_str(),
            rotation = self.config.rotation.is_some(),
            grouping = self.resolver.is_grouping(),
            max_open_files = self.pool.capacity(),
            "file exporter started"
        );
    }

    /// Write one batch
    ///
    /// Blocking: performs file I/O on the calling thread.
    pub fn export(&self, batch: TelemetryBatch) -> ExportOutcome {
        self.metrics.batch_received();

        let signal = batch.signal;
        let mut outcome = ExportOutcome::default();
        let mut groups: Vec<(PathBuf, Vec<ResourceTelemetry>)> = Vec::new();
        let mut index: HashMap<PathBuf, usize> = HashMap::new();

        for mut resource in batch.resources {
            let records = resource.records.len() as u64;
            match self.resolver.resolve(&mut resource) {
                Ok(PathDecision::Write(path)) => match index.get(&path).copied() {
                    Some(i) => groups[i].1.push(resource),
                    None => {
                        index.insert(path.clone(), groups.len());
                        groups.push((path, vec![resource]));
                    }
                },
                Ok(PathDecision::Discard) => outcome.discarded += records,
                Err(e) => {
                    let path = match &e {
                        SinkError::InvalidSubPath { path, .. } => path.clone(),
                        _ => PathBuf::from(&self.config.path),
                    };
                    self.logger.error("rejected destination", &e);
                    outcome.record_failure(path, records, &e);
                }
            }
        }

        for (path, resources) in groups {
            let unit = TelemetryBatch { signal, resources };
            let records = unit.record_count() as u64;

            let result = self
                .pipeline
                .encode_unit(&unit)
                .and_then(|bytes| self.pool.write(&path, &bytes));
            match result {
                Ok(report) => {
                    outcome.written += records;
                    self.metrics.records_written(records, report.bytes);
                }
                Err(e) => {
                    self.logger.error("export to destination failed", &e);
                    outcome.record_failure(path, records, &e);
                }
            }
        }

        self.metrics.records_discarded(outcome.discarded);
        self.metrics.records_failed(outcome.failed);
        outcome
    }

    /// Flush every open destination now
    pub fn flush(&self) -> Result<usize> {
        self.pool.flush_all()
    }

    /// Stop the flush task, then flush and close every file
    ///
    /// Later exports fail with `PoolClosed`.
    pub async fn shutdown(&self) -> Result<()> {
        let scheduler = self.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            scheduler.stop().await;
        }

        let pool = Arc::clone(&self.pool);
        let closed = tokio::task::spawn_blocking(move || pool.close_all())
            .await
            .map_err(|e| SinkError::Shutdown {
                failures: 1,
                first: e.to_string(),
            })??;

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            files_closed = closed,
            records_written = snapshot.records_written,
            bytes_written = snapshot.bytes_written,
            rotations = snapshot.rotations,
            "file exporter stopped"
        );
        Ok(())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn pool(&self) -> &Arc<HandlePool> {
        &self.pool
    }

    pub fn config(&self) -> &FileExporterConfig {
        &self.config
    }
}

#[cfg(test)]
#[path = "exporter_test.rs"]
mod exporter_test;
