//! Result of exporting one batch

use std::path::PathBuf;

use crate::common::{ErrorKind, SinkError};

/// Overall result for the upstream pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStatus {
    /// Nothing failed (discards are not failures)
    Success,
    /// Some destinations failed, some were written
    PartialFailure,
    /// Records failed and none were written
    Failure,
}

/// Records that could not reach one destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFailure {
    pub path: PathBuf,
    pub records: u64,
    pub reason: String,
    pub kind: ErrorKind,
}

/// Per-batch export report, counted in telemetry records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOutcome {
    pub written: u64,
    pub discarded: u64,
    pub failed: u64,
    pub failures: Vec<PathFailure>,
}

impl ExportOutcome {
    pub fn status(&self) -> ExportStatus {
        match (self.failed, self.written) {
            (0, _) => ExportStatus::Success,
            (_, 0) => ExportStatus::Failure,
            _ => ExportStatus::PartialFailure,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == ExportStatus::Success
    }

    /// Reason of the first failure, for summary logging
    pub fn first_reason(&self) -> Option<&str> {
        self.failures.first().map(|f| f.reason.as_str())
    }

    pub(crate) fn record_failure(&mut self, path: PathBuf, records: u64, error: &SinkError) {
        self.failed += records;
        self.failures.push(PathFailure {
            path,
            records,
            reason: error.to_string(),
            kind: error.kind(),
        });
    }
}
