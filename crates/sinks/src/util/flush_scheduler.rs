//! Periodic flush of every open destination
//!
//! A background task ticks at the configured flush interval and runs
//! [`HandlePool::flush_all`] on the blocking pool. Every
//! `RETENTION_SWEEP_INTERVAL` it also sweeps backup retention so age limits
//! apply to files that stopped rotating.
//!
//! Bytes written since the last tick are only as durable as the OS page
//! cache until the next tick or shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::util::handle_pool::HandlePool;

/// How often retention is re-applied to open destinations
pub const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Floor for the flush interval
const MIN_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to the running flush task
pub struct FlushScheduler {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl FlushScheduler {
    /// Start flushing `pool` every `interval`
    ///
    /// Must be called from within a Tokio runtime. A zero interval is
    /// treated as one second.
    pub fn spawn(pool: Arc<HandlePool>, interval: Duration) -> Self {
        Self::spawn_with_sweep(pool, interval, RETENTION_SWEEP_INTERVAL)
    }

    pub fn spawn_with_sweep(
        pool: Arc<HandlePool>,
        interval: Duration,
        sweep_interval: Duration,
    ) -> Self {
        let interval = if interval.is_zero() {
            MIN_FLUSH_INTERVAL
        } else {
            interval
        };
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(pool, interval, sweep_interval, cancel.clone()));
        Self { cancel, task }
    }

    /// Cancel the task and wait for an in-progress flush to finish
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "flush task failed");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

async fn run(
    pool: Arc<HandlePool>,
    interval: Duration,
    sweep_interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_sweep = Instant::now();

    tracing::debug!(interval = ?interval, "flush scheduler started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let sweep = last_sweep.elapsed() >= sweep_interval;
        if sweep {
            last_sweep = Instant::now();
        }

        let pool = Arc::clone(&pool);
        let result = tokio::task::spawn_blocking(move || {
            let flushed = pool.flush_all();
            let removed = if sweep { pool.sweep_retention() } else { 0 };
            (flushed, removed)
        })
        .await;

        match result {
            Ok((Ok(flushed), removed)) => {
                tracing::trace!(flushed, removed, "periodic flush");
            }
            // Already logged by the pool, rate-limited
            Ok((Err(_), _)) => {}
            Err(e) => tracing::error!(error = %e, "flush task panicked"),
        }
    }

    tracing::debug!("flush scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ExporterMetrics;
    use crate::util::handle_pool::PoolOptions;
    use crate::util::rate_limited_logger::RateLimitedLogger;
    use crate::util::rotation::{RotationPolicy, list_backups};
    use std::fs;
    use tempfile::TempDir;

    fn pool(options: PoolOptions) -> (Arc<HandlePool>, Arc<ExporterMetrics>) {
        let metrics = Arc::new(ExporterMetrics::new());
        let pool = HandlePool::new(
            options,
            Arc::clone(&metrics),
            Arc::new(RateLimitedLogger::default()),
        );
        (Arc::new(pool), metrics)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_periodic_flush_reaches_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        let (pool, metrics) = pool(PoolOptions::default());

        pool.write(&path, b"buffered\n").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"");

        let scheduler = FlushScheduler::spawn(Arc::clone(&pool), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop().await;

        assert_eq!(fs::read(&path).unwrap(), b"buffered\n");
        assert!(metrics.snapshot().flush_count >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_ends_task() {
        let (pool, _) = pool(PoolOptions::default());
        let scheduler = FlushScheduler::spawn(pool, Duration::ZERO);
        assert!(scheduler.is_running());
        scheduler.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sweep_applies_retention() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        let policy = RotationPolicy::new(1024, 1, None);
        let (pool, _) = pool(PoolOptions {
            rotation: Some(policy),
            ..PoolOptions::default()
        });

        pool.write(&path, b"live").unwrap();
        // Backups left behind by an earlier run
        for seq in 0..3 {
            let name = policy.next_backup_path(&path, policy.now());
            fs::write(&name, format!("old {seq}")).unwrap();
        }
        assert_eq!(list_backups(&path).unwrap().len(), 3);

        let scheduler = FlushScheduler::spawn_with_sweep(
            Arc::clone(&pool),
            Duration::from_millis(20),
            Duration::ZERO,
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop().await;

        assert_eq!(list_backups(&path).unwrap().len(), 1);
    }
}
