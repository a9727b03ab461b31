//! Spool - durable file sink for telemetry batches
//!
//! Reads newline-delimited JSON `TelemetryBatch` documents from stdin and
//! writes them through the file exporter until EOF or a shutdown signal.
//!
//! # Usage
//!
//! ```bash
//! spool --config spool.toml
//! otel-dump | spool --config spool.toml --log-level debug
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use spool_config::{Config, LogFormat};
use spool_protocol::TelemetryBatch;
use spool_sinks::{ExportStatus, FileExporter};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Spool - durable file sink for telemetry batches
#[derive(Parser, Debug)]
#[command(name = "spool")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "spool.toml")]
    config: PathBuf,

    /// Log level, overrides `[log] level` (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(config.log.level.as_str());
    init_logging(level, config.log.format)?;

    let exporter = Arc::new(FileExporter::new(config.exporter)?);
    exporter.start();

    let stdin = BufReader::new(tokio::io::stdin());
    if let Err(e) = feed(stdin, Arc::clone(&exporter), wait_for_shutdown()).await {
        tracing::error!(error = %e, "input stream failed");
    }

    exporter.shutdown().await?;
    Ok(())
}

/// Export every batch read from `input` until EOF or `shutdown`
///
/// Shutdown is only observed between lines, so a batch handed to the
/// exporter is always awaited and its outcome logged.
async fn feed<R>(
    input: R,
    exporter: Arc<FileExporter>,
    shutdown: impl Future<Output = ()>,
) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut line_no = 0u64;
    tokio::pin!(shutdown);

    loop {
        let next = tokio::select! {
            line = lines.next_line() => line?,
            () = &mut shutdown => {
                tracing::info!(lines = line_no, "shutdown signal received");
                return Ok(line_no);
            }
        };
        let Some(line) = next else {
            break;
        };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let batch: TelemetryBatch = match serde_json::from_str(&line) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "skipping malformed batch");
                continue;
            }
        };

        let exporter = Arc::clone(&exporter);
        let outcome = tokio::task::spawn_blocking(move || exporter.export(batch)).await?;

        match outcome.status() {
            ExportStatus::Success => tracing::debug!(
                line = line_no,
                written = outcome.written,
                discarded = outcome.discarded,
                "exported batch"
            ),
            status => tracing::warn!(
                line = line_no,
                status = ?status,
                written = outcome.written,
                failed = outcome.failed,
                reason = outcome.first_reason().unwrap_or_default(),
                "batch partially exported"
            ),
        }
    }

    tracing::info!(lines = line_no, "end of input");
    Ok(line_no)
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Console => registry
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use spool_config::FileExporterConfig;
    use spool_protocol::{KeyValue, Resource, ResourceTelemetry, Signal, TelemetryRecord};
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    use super::*;

    fn batch_line(records: usize) -> String {
        let records = (0..records)
            .map(|i| TelemetryRecord::new(i as u64, "INFO", format!("line {i}")))
            .collect();
        let batch = TelemetryBatch::new(
            Signal::Logs,
            vec![ResourceTelemetry::new(
                Resource::with_attributes(vec![KeyValue::string("service.name", "api")]),
                records,
            )],
        );
        format!("{}\n", serde_json::to_string(&batch).unwrap())
    }

    fn exporter(dir: &TempDir) -> Arc<FileExporter> {
        let path = dir.path().join("out.json");
        Arc::new(FileExporter::new(FileExporterConfig::new(path.to_string_lossy())).unwrap())
    }

    #[tokio::test]
    async fn test_feed_exports_until_eof() {
        let dir = TempDir::new().unwrap();
        let exporter = exporter(&dir);
        let input = format!("{}\nnot json\n{}", batch_line(2), batch_line(3));

        let lines = feed(input.as_bytes(), Arc::clone(&exporter), std::future::pending())
            .await
            .unwrap();

        assert_eq!(lines, 4);
        assert_eq!(exporter.metrics().records_written, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_waits_for_started_export() {
        let dir = TempDir::new().unwrap();
        let exporter = exporter(&dir);
        let (mut tx, rx) = tokio::io::duplex(64 * 1024);
        tx.write_all(batch_line(4).as_bytes()).await.unwrap();

        // Input stays open; only the signal ends the feed.
        let shutdown = tokio::time::sleep(Duration::from_millis(200));
        let lines = feed(BufReader::new(rx), Arc::clone(&exporter), shutdown)
            .await
            .unwrap();

        assert_eq!(lines, 1);
        assert_eq!(exporter.metrics().records_written, 4);
        exporter.shutdown().await.unwrap();
        drop(tx);
    }
}
