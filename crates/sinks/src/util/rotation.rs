//! Rotation policy
//!
//! Pure decisions about when a destination file rotates, what its backup
//! is called, and which backups retention removes. The only filesystem
//! access is the directory scan in [`list_backups`], which also picks the
//! next sequence number for a backup name.
//!
//! # Backup names
//!
//! ```text
//! /out/app.log                           live file
//! /out/app-2024-05-01T10-15-30.250.log   backup
//! /out/app-2024-05-01T10-15-30.250-1.log second rotation within the same millisecond
//! ```
//!
//! The live name is split at its last dot. Names sort chronologically by
//! `(timestamp, sequence)` and are rediscovered by scanning the directory,
//! so retention works the same for a file that was evicted and reopened.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDateTime, Timelike, Utc};
use spool_config::RotationConfig;

/// Timestamp layout embedded in backup names
pub const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";

/// Length of a formatted `BACKUP_TIME_FORMAT` timestamp
const BACKUP_TIME_LEN: usize = 23;

/// Size, count, and age limits for one destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    max_bytes: u64,
    max_backups: usize,
    max_age: Option<Duration>,
    localtime: bool,
}

/// A backup file found next to a live file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFile {
    pub path: PathBuf,
    pub timestamp: NaiveDateTime,
    pub seq: u32,
}

impl RotationPolicy {
    /// `max_backups = 0` keeps every backup, `max_age = None` disables
    /// age pruning.
    pub fn new(max_bytes: u64, max_backups: usize, max_age: Option<Duration>) -> Self {
        Self {
            max_bytes: max_bytes.max(1),
            max_backups,
            max_age,
            localtime: false,
        }
    }

    pub fn from_config(config: &RotationConfig) -> Self {
        Self {
            max_bytes: config.max_bytes(),
            max_backups: config.max_backups,
            max_age: config.max_age(),
            localtime: config.localtime,
        }
    }

    /// Use local time instead of UTC in backup names
    pub fn with_localtime(mut self, localtime: bool) -> Self {
        self.localtime = localtime;
        self
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn max_backups(&self) -> usize {
        self.max_backups
    }

    /// Whether writing `incoming` bytes to a file of `current` bytes must
    /// rotate first
    ///
    /// An empty file never rotates, so a unit larger than the limit lands
    /// whole in a fresh file instead of producing an empty backup.
    pub fn should_rotate(&self, current: u64, incoming: u64) -> bool {
        current > 0 && current.saturating_add(incoming) > self.max_bytes
    }

    /// Wall clock in the zone backup names use
    pub fn now(&self) -> NaiveDateTime {
        if self.localtime {
            Local::now().naive_local()
        } else {
            Utc::now().naive_utc()
        }
    }

    /// Backup name for `live` at `now`, before collision handling
    pub fn backup_name(&self, live: &Path, now: NaiveDateTime) -> PathBuf {
        backup_path(live, now, 0)
    }

    /// Backup name for `live` at `now` that sorts after every existing
    /// backup with the same timestamp
    ///
    /// The sequence continues from the highest one on disk rather than
    /// reusing a gap left by retention.
    pub fn next_backup_path(&self, live: &Path, now: NaiveDateTime) -> PathBuf {
        let stamp = truncate_to_millis(now);
        let mut seq = list_backups(live)
            .unwrap_or_default()
            .iter()
            .filter(|b| b.timestamp == stamp)
            .map(|b| b.seq + 1)
            .max()
            .unwrap_or(0);
        loop {
            let candidate = backup_path(live, now, seq);
            if !candidate.exists() {
                return candidate;
            }
            seq += 1;
        }
    }

    /// Backups retention should delete, oldest first
    ///
    /// Newest `max_backups` survive the count limit; of those, anything
    /// older than `max_age` relative to `now` goes too.
    pub fn select_for_removal(
        &self,
        mut backups: Vec<BackupFile>,
        now: NaiveDateTime,
    ) -> Vec<BackupFile> {
        backups.sort_by(|a, b| (b.timestamp, b.seq).cmp(&(a.timestamp, a.seq)));

        let mut removed = if self.max_backups > 0 && backups.len() > self.max_backups {
            backups.split_off(self.max_backups)
        } else {
            Vec::new()
        };

        if let Some(max_age) = self.max_age
            && let Ok(max_age) = chrono::Duration::from_std(max_age)
            && let Some(cutoff) = now.checked_sub_signed(max_age)
        {
            let (expired, _): (Vec<_>, Vec<_>) =
                backups.into_iter().partition(|b| b.timestamp < cutoff);
            removed.extend(expired);
        }

        removed.sort_by(|a, b| (a.timestamp, a.seq).cmp(&(b.timestamp, b.seq)));
        removed
    }

    /// Delete the backups of `live` that fall outside retention
    ///
    /// Keeps going after a failed delete and returns the first error.
    /// Files already gone are not errors. Returns the number removed.
    pub fn apply_retention(&self, live: &Path) -> io::Result<usize> {
        let backups = list_backups(live)?;
        let mut removed = 0;
        let mut first_error = None;

        for backup in self.select_for_removal(backups, self.now()) {
            match fs::remove_file(&backup.path) {
                Ok(()) => {
                    removed += 1;
                    tracing::debug!(path = %backup.path.display(), "removed backup");
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }
}

/// Split a file name at its last dot; a leading dot is part of the stem
fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => name.split_at(i),
        _ => (name, ""),
    }
}

/// Drop sub-millisecond precision, matching what a backup name records
fn truncate_to_millis(time: NaiveDateTime) -> NaiveDateTime {
    let millis = time.nanosecond() / 1_000_000 * 1_000_000;
    time.with_nanosecond(millis).unwrap_or(time)
}

fn backup_path(live: &Path, now: NaiveDateTime, seq: u32) -> PathBuf {
    let name = live
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, ext) = split_name(&name);
    let stamp = now.format(BACKUP_TIME_FORMAT);

    let backup = if seq == 0 {
        format!("{stem}-{stamp}{ext}")
    } else {
        format!("{stem}-{stamp}-{seq}{ext}")
    };
    live.with_file_name(backup)
}

/// Whether `name` could be parsed as the backup of some other live file
/// in the same directory
///
/// True when the name contains `-<timestamp>` followed by nothing, an
/// extension, or a `-<n>` sequence with an optional extension.
pub fn is_backup_name(name: &str) -> bool {
    let is_ext = |rest: &str| rest.strip_prefix('.').is_some_and(|e| !e.contains('.'));

    name.match_indices('-').any(|(i, _)| {
        let Some(stamp) = name.get(i + 1..i + 1 + BACKUP_TIME_LEN) else {
            return false;
        };
        if i == 0 || NaiveDateTime::parse_from_str(stamp, BACKUP_TIME_FORMAT).is_err() {
            return false;
        }
        let rest = &name[i + 1 + BACKUP_TIME_LEN..];
        if rest.is_empty() || is_ext(rest) {
            return true;
        }
        let Some(seq) = rest.strip_prefix('-') else {
            return false;
        };
        let (digits, ext) = match seq.find('.') {
            Some(dot) => seq.split_at(dot),
            None => (seq, ""),
        };
        digits.parse::<u32>().is_ok() && (ext.is_empty() || is_ext(ext))
    })
}

/// Parse `candidate` as a backup of `live`
pub fn parse_backup(live: &Path, candidate: &Path) -> Option<BackupFile> {
    let live_name = live.file_name()?.to_str()?;
    let name = candidate.file_name()?.to_str()?;
    let (stem, ext) = split_name(live_name);

    let middle = name
        .strip_prefix(stem)?
        .strip_prefix('-')?
        .strip_suffix(ext)?;
    let stamp = middle.get(..BACKUP_TIME_LEN)?;
    let timestamp = NaiveDateTime::parse_from_str(stamp, BACKUP_TIME_FORMAT).ok()?;

    let seq = match &middle[BACKUP_TIME_LEN..] {
        "" => 0,
        rest => rest.strip_prefix('-')?.parse().ok()?,
    };

    Some(BackupFile {
        path: candidate.to_path_buf(),
        timestamp,
        seq,
    })
}

/// Scan the live file's directory for its backups
///
/// A missing directory yields no backups.
pub fn list_backups(live: &Path) -> io::Result<Vec<BackupFile>> {
    let dir = match live.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut backups = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(backup) = parse_backup(live, &entry.path()) {
            backups.push(backup);
        }
    }
    Ok(backups)
}

#[cfg(test)]
#[path = "rotation_test.rs"]
mod rotation_test;
