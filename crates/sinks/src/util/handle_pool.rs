//! Bounded pool of open destination files
//!
//! The pool is the only component that opens and closes files. It maps a
//! destination path to a shared entry and keeps at most `max_open_files`
//! entries, evicting the least recently used one to make room.
//!
//! # Locking
//!
//! ```text
//! table: Mutex<LruCache<PathBuf, Arc<PoolEntry>>>   lookup / insert / evict only
//! entry: Mutex<EntryState>                          one per path, held for a write
//! ```
//!
//! The table lock is never held across file I/O. The only nesting is
//! table → entry on a freshly inserted entry, which nobody else can hold
//! yet, so a new entry stays locked until its creator has closed the
//! evicted victim and opened the file. That keeps the number of open files
//! at or below the entry count.
//!
//! Eviction takes the victim's entry lock before closing it, so an in-flight
//! write finishes first. A writer that loses the race finds the entry
//! `Closed`, gets [`SinkError::Evicted`], and looks the path up again.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use spool_config::FileExporterConfig;

use crate::common::{ExporterMetrics, Result, SinkError};
use crate::util::rate_limited_logger::RateLimitedLogger;
use crate::util::rotating_file::{RotatingFile, WriteReport};
use crate::util::rotation::RotationPolicy;

/// Attempts before a write gives up chasing evictions
const MAX_ACQUIRE_ATTEMPTS: usize = 16;

/// Pool settings derived from the exporter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    pub max_open_files: usize,
    pub auto_create_directories: bool,
    pub rotation: Option<RotationPolicy>,
}

impl PoolOptions {
    pub fn from_config(config: &FileExporterConfig) -> Self {
        Self {
            max_open_files: config.max_open_files(),
            auto_create_directories: config.auto_create_directories(),
            rotation: config.rotation.as_ref().map(RotationPolicy::from_config),
        }
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_open_files: spool_config::DEFAULT_MAX_OPEN_FILES,
            auto_create_directories: true,
            rotation: None,
        }
    }
}

enum EntryState {
    /// Inserted, file not opened yet
    Pending,
    Active(RotatingFile),
    /// Evicted, failed to open, or shut down
    Closed,
}

struct PoolEntry {
    path: PathBuf,
    state: Mutex<EntryState>,
}

/// Borrowed access to one destination
///
/// Dropping the handle returns it to the pool; the file stays open.
pub struct Handle {
    entry: Arc<PoolEntry>,
}

impl Handle {
    pub fn path(&self) -> &Path {
        &self.entry.path
    }

    /// Write one unit under the entry lock
    pub fn write(&self, data: &[u8]) -> Result<WriteReport> {
        match &mut *self.entry.state.lock() {
            EntryState::Active(file) => file.write(data),
            EntryState::Pending | EntryState::Closed => Err(SinkError::evicted(&self.entry.path)),
        }
    }

    pub fn flush(&self) -> Result<bool> {
        match &mut *self.entry.state.lock() {
            EntryState::Active(file) => file.flush(),
            EntryState::Pending | EntryState::Closed => Ok(false),
        }
    }
}

/// Bounded, LRU-evicting cache of open files
pub struct HandlePool {
    table: Mutex<LruCache<PathBuf, Arc<PoolEntry>>>,
    options: PoolOptions,
    closed: AtomicBool,
    metrics: Arc<ExporterMetrics>,
    logger: Arc<RateLimitedLogger>,
}

impl HandlePool {
    pub fn new(
        options: PoolOptions,
        metrics: Arc<ExporterMetrics>,
        logger: Arc<RateLimitedLogger>,
    ) -> Self {
        Self {
            table: Mutex::new(LruCache::unbounded()),
            options: PoolOptions {
                max_open_files: options.max_open_files.max(1),
                ..options
            },
            closed: AtomicBool::new(false),
            metrics,
            logger,
        }
    }

    /// Get the open handle for `path`, opening it if needed
    ///
    /// # Errors
    ///
    /// - `MissingDirectory` if the parent is absent and auto-create is off
    /// - `Resource` if the directory or file cannot be created or opened
    /// - `PoolClosed` after `close_all`
    pub fn acquire(&self, path: &Path) -> Result<Handle> {
        for _ in 0..MAX_ACQUIRE_ATTEMPTS {
            let mut table = self.table.lock();
            if self.closed.load(Ordering::Acquire) {
                return Err(SinkError::PoolClosed);
            }

            let (entry, victim, fresh) = match table.get(path).cloned() {
                Some(entry) => (entry, None, false),
                None => {
                    let victim = if table.len() >= self.options.max_open_files {
                        table.pop_lru().map(|(_, entry)| entry)
                    } else {
                        None
                    };
                    let entry = Arc::new(PoolEntry {
                        path: path.to_path_buf(),
                        state: Mutex::new(EntryState::Pending),
                    });
                    table.put(path.to_path_buf(), Arc::clone(&entry));
                    (entry, victim, true)
                }
            };
            let early = fresh.then(|| entry.state.lock());
            drop(table);

            if let Some(victim) = victim {
                self.metrics.eviction();
                self.retire(&victim);
            }

            let mut state = early.unwrap_or_else(|| entry.state.lock());
            let pending = match &*state {
                EntryState::Active(_) => Some(false),
                EntryState::Pending => Some(true),
                EntryState::Closed => None,
            };
            let Some(pending) = pending else {
                // Evicted or failed to open while we waited; drop the stale
                // mapping if it is still there and look again.
                drop(state);
                self.forget(&entry);
                continue;
            };
            if pending {
                match self.open(path) {
                    Ok(file) => {
                        self.metrics.file_opened();
                        *state = EntryState::Active(file);
                    }
                    Err(e) => {
                        *state = EntryState::Closed;
                        drop(state);
                        self.forget(&entry);
                        return Err(e);
                    }
                }
            }
            drop(state);
            return Ok(Handle { entry });
        }

        Err(SinkError::evicted(path))
    }

    /// Return a handle to the pool
    ///
    /// Marks the path as most recently used; the file stays open.
    pub fn release(&self, handle: Handle) {
        let mut table = self.table.lock();
        if let Some(current) = table.get(&handle.entry.path)
            && !Arc::ptr_eq(current, &handle.entry)
        {
            tracing::trace!(path = %handle.entry.path.display(), "released stale handle");
        }
    }

    /// Acquire, write, and release, retrying if the entry was evicted
    /// between lookup and write
    pub fn write(&self, path: &Path, data: &[u8]) -> Result<WriteReport> {
        for _ in 0..MAX_ACQUIRE_ATTEMPTS {
            let handle = self.acquire(path)?;
            match handle.write(data) {
                Ok(report) => {
                    if report.rotated {
                        self.metrics.rotation();
                    }
                    self.release(handle);
                    return Ok(report);
                }
                Err(SinkError::Evicted { .. }) => continue,
                Err(e) => {
                    self.metrics.write_error();
                    return Err(e);
                }
            }
        }
        Err(SinkError::evicted(path))
    }

    /// Close and remove the least recently used entry
    ///
    /// Returns false if the pool is empty.
    pub fn evict_one(&self) -> bool {
        let victim = self.table.lock().pop_lru();
        match victim {
            Some((_, entry)) => {
                self.metrics.eviction();
                self.retire(&entry);
                true
            }
            None => false,
        }
    }

    /// Flush every dirty entry
    ///
    /// Every entry is attempted; the first failure is returned. On success
    /// returns the number of files flushed.
    pub fn flush_all(&self) -> Result<usize> {
        let mut flushed = 0;
        let mut first_error = None;

        for entry in self.entries() {
            let result = match &mut *entry.state.lock() {
                EntryState::Active(file) => file.flush(),
                EntryState::Pending | EntryState::Closed => Ok(false),
            };
            match result {
                Ok(true) => {
                    flushed += 1;
                    self.metrics.flush();
                }
                Ok(false) => {}
                Err(e) => {
                    self.metrics.write_error();
                    self.logger.error("flush failed", &e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(flushed),
        }
    }

    /// Apply backup retention to every open destination
    ///
    /// Catches age-based expiry for files that have not rotated recently.
    pub fn sweep_retention(&self) -> usize {
        if self.options.rotation.is_none() {
            return 0;
        }
        let mut removed = 0;
        for entry in self.entries() {
            if let EntryState::Active(file) = &*entry.state.lock() {
                removed += file.enforce_retention();
            }
        }
        removed
    }

    /// Drain, flush, and close every entry, then refuse new acquires
    ///
    /// Waits for in-flight writes through the entry locks. Every entry is
    /// closed even if some fail; failures are reported together.
    pub fn close_all(&self) -> Result<usize> {
        let entries: Vec<_> = {
            let mut table = self.table.lock();
            self.closed.store(true, Ordering::Release);
            std::iter::from_fn(|| table.pop_lru())
                .map(|(_, entry)| entry)
                .collect()
        };

        let mut closed = 0;
        let mut failures = 0;
        let mut first = None;
        for entry in entries {
            match self.close_entry(&entry) {
                Ok(true) => closed += 1,
                Ok(false) => {}
                Err(e) => {
                    failures += 1;
                    tracing::error!(path = %entry.path.display(), error = %e, "failed to close file");
                    first.get_or_insert_with(|| e.to_string());
                }
            }
        }

        match first {
            Some(first) => Err(SinkError::Shutdown { failures, first }),
            None => Ok(closed),
        }
    }

    /// Entries currently in the table
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.options.max_open_files
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether `path` has a live entry
    pub fn contains(&self, path: &Path) -> bool {
        self.table.lock().contains(path)
    }

    /// Snapshot of the table, most recently used first
    fn entries(&self) -> Vec<Arc<PoolEntry>> {
        self.table
            .lock()
            .iter()
            .map(|(_, entry)| Arc::clone(entry))
            .collect()
    }

    fn open(&self, path: &Path) -> Result<RotatingFile> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
            && !dir.is_dir()
        {
            if !self.options.auto_create_directories {
                return Err(SinkError::MissingDirectory {
                    dir: dir.to_path_buf(),
                });
            }
            fs::create_dir_all(dir).map_err(|e| SinkError::resource(dir, e))?;
        }

        let file = RotatingFile::open(path, self.options.rotation, Arc::clone(&self.logger))?;
        tracing::debug!(path = %path.display(), size = file.size(), "opened file");
        Ok(file)
    }

    /// Remove `entry` from the table if it is still the current one
    fn forget(&self, entry: &Arc<PoolEntry>) {
        let mut table = self.table.lock();
        if table
            .peek(&entry.path)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
        {
            table.pop(&entry.path);
        }
    }

    /// Close an evicted entry, logging failures
    fn retire(&self, entry: &PoolEntry) {
        match self.close_entry(entry) {
            Ok(_) => tracing::debug!(path = %entry.path.display(), "evicted file handle"),
            Err(e) => {
                self.metrics.write_error();
                self.logger.error("failed to close evicted file", &e);
            }
        }
    }

    /// Take the entry lock, mark it closed, and close its file
    fn close_entry(&self, entry: &PoolEntry) -> Result<bool> {
        let state = std::mem::replace(&mut *entry.state.lock(), EntryState::Closed);
        match state {
            EntryState::Active(file) => {
                self.metrics.file_closed();
                file.close().map(|()| true)
            }
            EntryState::Pending | EntryState::Closed => Ok(false),
        }
    }
}

#[cfg(test)]
#[path = "handle_pool_test.rs"]
mod handle_pool_test;
