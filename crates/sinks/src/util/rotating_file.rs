//! One open destination file
//!
//! `RotatingFile` owns the buffered handle for a destination path, tracks
//! its size, and performs size-triggered rotation inside `write`:
//!
//! ```text
//! flush live → rename live to backup → open fresh live → swap writer → retention
//! ```
//!
//! A failed rename is logged and the unit goes to the current file. If the
//! fresh file cannot be opened the backup is renamed back to the live name,
//! so the destination never keeps writing under a backup name. Callers serialize access; the handle pool wraps each
//! `RotatingFile` in a per-path mutex.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::common::{Result, SinkError};
use crate::util::rate_limited_logger::RateLimitedLogger;
use crate::util::rotation::RotationPolicy;

/// Write buffer in front of each file
pub const DEFAULT_WRITE_BUFFER: usize = 64 * 1024;

/// Result of one `RotatingFile::write`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    pub bytes: u64,
    pub rotated: bool,
}

pub struct RotatingFile {
    path: PathBuf,
    writer: BufWriter<File>,
    size: u64,
    opened_at: Instant,
    last_used: Instant,
    dirty: bool,
    /// Writer lost its live name after a failed rotation
    detached: bool,
    policy: Option<RotationPolicy>,
    logger: Arc<RateLimitedLogger>,
}

impl RotatingFile {
    /// Open `path` for appending, creating it if needed
    ///
    /// The size is read back from the file so an evicted and reopened
    /// destination keeps rotating at the right point.
    pub fn open(
        path: &Path,
        policy: Option<RotationPolicy>,
        logger: Arc<RateLimitedLogger>,
    ) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SinkError::resource(path, e))?;
        let size = file
            .metadata()
            .map_err(|e| SinkError::resource(path, e))?
            .len();

        let now = Instant::now();
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::with_capacity(DEFAULT_WRITE_BUFFER, file),
            size,
            opened_at: now,
            last_used: now,
            dirty: false,
            detached: false,
            policy,
            logger,
        })
    }

    /// Write one unit, rotating first if it would overflow the file
    pub fn write(&mut self, data: &[u8]) -> Result<WriteReport> {
        let incoming = data.len() as u64;
        let mut rotated = false;

        if self.detached
            && let Err(e) = self.reattach()
        {
            self.logger.warn("live file still detached", &e);
        }

        if let Some(policy) = self.policy
            && policy.should_rotate(self.size, incoming)
        {
            match self.rotate(&policy) {
                Ok(()) => rotated = true,
                Err(e) => {
                    self.logger
                        .warn("rotation failed, writing to current file", &e);
                }
            }
        }

        self.writer
            .write_all(data)
            .map_err(|e| SinkError::write(&self.path, e))?;
        self.size += incoming;
        self.dirty = true;
        self.last_used = Instant::now();

        if rotated {
            self.enforce_retention();
        }

        Ok(WriteReport {
            bytes: incoming,
            rotated,
        })
    }

    fn rotate(&mut self, policy: &RotationPolicy) -> Result<()> {
        self.rotate_with(policy, open_fresh)
    }

    fn rotate_with(
        &mut self,
        policy: &RotationPolicy,
        open: impl FnOnce(&Path) -> io::Result<File>,
    ) -> Result<()> {
        self.writer
            .flush()
            .and_then(|()| self.writer.get_ref().sync_data())
            .map_err(|e| SinkError::flush(&self.path, e))?;
        self.dirty = false;

        let backup = policy.next_backup_path(&self.path, policy.now());
        std::fs::rename(&self.path, &backup).map_err(|e| SinkError::rotation(&self.path, e))?;

        let fresh = match open(&self.path) {
            Ok(file) => file,
            Err(e) => {
                // The open writer now points at the backup; put it back so
                // later writes still land under the live name.
                self.restore(&backup);
                return Err(SinkError::rotation(&self.path, e));
            }
        };

        // Buffer is empty after the flush above, dropping the old writer
        // only closes the backup.
        drop(std::mem::replace(
            &mut self.writer,
            BufWriter::with_capacity(DEFAULT_WRITE_BUFFER, fresh),
        ));
        self.size = 0;
        self.opened_at = Instant::now();

        tracing::info!(
            path = %self.path.display(),
            backup = %backup.display(),
            "rotated file"
        );
        Ok(())
    }

    /// Undo a rename whose replacement file could not be opened
    fn restore(&mut self, backup: &Path) {
        if let Err(e) = std::fs::rename(backup, &self.path) {
            self.detached = true;
            self.logger.warn(
                "failed to restore live file after rotation",
                &SinkError::rotation(backup, e),
            );
        }
    }

    /// Reopen the live path after a failed restore
    ///
    /// Until this succeeds units keep going to the backup the writer
    /// still holds.
    fn reattach(&mut self) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SinkError::resource(&self.path, e))?;
        let size = file
            .metadata()
            .map_err(|e| SinkError::resource(&self.path, e))?
            .len();

        let old = std::mem::replace(
            &mut self.writer,
            BufWriter::with_capacity(DEFAULT_WRITE_BUFFER, file),
        );
        if let Err(e) = old.into_inner() {
            self.logger
                .warn("failed to flush detached file", &SinkError::flush(&self.path, e.into_error()));
        }
        self.size = size;
        self.opened_at = Instant::now();
        self.detached = false;
        tracing::info!(path = %self.path.display(), "reattached live file");
        Ok(())
    }

    /// Delete backups outside the retention limits
    pub fn enforce_retention(&self) -> usize {
        let Some(policy) = self.policy else {
            return 0;
        };
        match policy.apply_retention(&self.path) {
            Ok(removed) => removed,
            Err(e) => {
                self.logger
                    .warn("backup retention failed", &SinkError::rotation(&self.path, e));
                0
            }
        }
    }

    /// Push buffered bytes to the OS and sync file data
    ///
    /// Returns false without touching the file when nothing was written
    /// since the last flush.
    pub fn flush(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        self.writer
            .flush()
            .and_then(|()| self.writer.get_ref().sync_data())
            .map_err(|e| SinkError::flush(&self.path, e))?;
        self.dirty = false;
        Ok(true)
    }

    /// Flush, sync, and close
    pub fn close(self) -> Result<()> {
        let path = self.path;
        let file = self
            .writer
            .into_inner()
            .map_err(|e| SinkError::flush(&path, e.into_error()))?;
        file.sync_all().map_err(|e| SinkError::flush(&path, e))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes in the live file, including buffered bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// When the live file was opened or last rotated
    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    pub fn policy(&self) -> Option<&RotationPolicy> {
        self.policy.as_ref()
    }
}

fn open_fresh(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
}

impl std::fmt::Debug for RotatingFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatingFile")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("dirty", &self.dirty)
            .finish()
    }
}

#[cfg(test)]
#[path = "rotating_file_test.rs"]
mod rotating_file_test;
