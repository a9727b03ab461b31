//! Rate-limited error logging
//!
//! A full disk or a read-only directory makes every write fail. Instead of
//! one log line per failed write, the logger emits at most one line per
//! interval and reports how many were suppressed in between.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default interval between log lines
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Logger that emits at most once per interval
///
/// Warnings and errors share one window, so a burst of rotation warnings
/// also suppresses write errors and vice versa.
pub struct RateLimitedLogger {
    min_interval: Duration,
    last_log_time: Mutex<Option<Instant>>,
    /// Events since the last emitted line
    pending: AtomicU64,
    total: AtomicU64,
}

impl RateLimitedLogger {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_log_time: Mutex::new(None),
            pending: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Record an error, logging it if the window allows
    ///
    /// Returns true if a line was emitted.
    pub fn error(&self, message: &str, error: &dyn std::fmt::Display) -> bool {
        let Some(suppressed) = self.admit() else {
            return false;
        };
        tracing::error!(
            message = %message,
            error = %error,
            suppressed_count = suppressed,
            total_errors = self.total_count(),
            "file exporter error"
        );
        true
    }

    /// Record a recoverable failure (rotation, retention) at warn level
    pub fn warn(&self, message: &str, error: &dyn std::fmt::Display) -> bool {
        let Some(suppressed) = self.admit() else {
            return false;
        };
        tracing::warn!(
            message = %message,
            error = %error,
            suppressed_count = suppressed,
            total_errors = self.total_count(),
            "file exporter warning"
        );
        true
    }

    /// Count one event; returns the suppressed count if it may be logged
    fn admit(&self) -> Option<u64> {
        self.pending.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);

        {
            let mut last = self.last_log_time.lock();
            let now = Instant::now();
            match *last {
                Some(at) if now.duration_since(at) < self.min_interval => return None,
                _ => *last = Some(now),
            }
        }

        let count = self.pending.swap(0, Ordering::Relaxed);
        Some(count.saturating_sub(1))
    }

    /// Events recorded since the last emitted line
    pub fn pending_count(&self) -> u64 {
        self.pending.load(Ordering::Relaxed)
    }

    /// Events ever recorded
    pub fn total_count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl Default for RateLimitedLogger {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_first_event_logs() {
        let logger = RateLimitedLogger::default();
        let error = io::Error::other("disk full");

        assert!(logger.error("write failed", &error));
        assert_eq!(logger.total_count(), 1);
        assert_eq!(logger.pending_count(), 0);
    }

    #[test]
    fn test_rapid_events_suppressed() {
        let logger = RateLimitedLogger::new(Duration::from_secs(10));
        let error = io::Error::other("disk full");

        assert!(logger.error("write failed", &error));
        for _ in 0..10 {
            assert!(!logger.error("write failed", &error));
        }

        assert_eq!(logger.total_count(), 11);
        assert_eq!(logger.pending_count(), 10);
    }

    #[test]
    fn test_warn_shares_window() {
        let logger = RateLimitedLogger::new(Duration::from_secs(10));
        let error = io::Error::other("rename failed");

        assert!(logger.warn("rotation failed", &error));
        assert!(!logger.error("write failed", &error));
        assert_eq!(logger.total_count(), 2);
    }

    #[test]
    fn test_zero_interval_always_logs() {
        let logger = RateLimitedLogger::new(Duration::ZERO);
        let error = io::Error::other("boom");

        for _ in 0..3 {
            assert!(logger.warn("retention failed", &error));
        }
        assert_eq!(logger.pending_count(), 0);
    }
}
