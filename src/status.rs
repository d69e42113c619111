//! Read-only reporting over the backup root and the event log.
//!
//! Nothing here writes to disk. Missing directories read as empty.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{BackupError, Result};
use crate::events::{LogFileKind, LogRecord, bytes_to_mb, parse_log_file_name};
use crate::storage::layout::{DUMP_EXTENSION, parse_partition_name};
use crate::storage::lock::{LockHolder, RunLock};

/// Default number of recent log entries in a report.
pub const DEFAULT_RECENT: usize = 20;

/// Aggregate view of backups and logs.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub server_time: DateTime<Utc>,
    pub backup_root: PathBuf,
    pub total_backups: usize,
    pub total_bytes: u64,
    pub total_size_mb: f64,
    pub backup_dates: Vec<String>,
    pub events: EventCounts,
    pub log_dir: PathBuf,
    pub log_files: Vec<LogFileInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock: Option<LockHolder>,
    pub recent: Vec<LogRecord>,
}

/// Outcome events found in the main log files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventCounts {
    pub success: usize,
    pub failure: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogFileInfo {
    pub name: String,
    pub size_bytes: u64,
    pub size_kb: f64,
}

/// Where the reporter looks.
#[derive(Debug, Clone)]
pub struct StatusSources<'a> {
    pub backup_root: &'a Path,
    pub log_dir: &'a Path,
    pub lock_path: &'a Path,
}

/// Build a report from the current state of disk.
#[must_use]
pub fn collect(sources: &StatusSources<'_>, recent: usize) -> StatusReport {
    let (total_backups, total_bytes) = artifact_totals(sources.backup_root);
    let log_files = list_log_files(sources.log_dir);

    let lock = RunLock::holder(sources.lock_path).unwrap_or_else(|err| {
        debug!(path = %sources.lock_path.display(), error = %err, "cannot inspect lock marker");
        None
    });

    StatusReport {
        server_time: Utc::now(),
        backup_root: sources.backup_root.to_path_buf(),
        total_backups,
        total_bytes,
        total_size_mb: bytes_to_mb(total_bytes),
        backup_dates: backup_dates(sources.backup_root),
        events: count_events(sources.log_dir),
        log_dir: sources.log_dir.to_path_buf(),
        log_files,
        lock,
        recent: recent_entries(sources.log_dir, recent),
    }
}

/// Date partitions under the backup root, oldest first.
#[must_use]
pub fn backup_dates(root: &Path) -> Vec<String> {
    let mut dates: Vec<String> = readable_entries(root)
        .into_iter()
        .filter(|entry| entry.file_type().is_ok_and(|ty| ty.is_dir()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| parse_partition_name(name).is_some())
        .collect();
    dates.sort();
    dates
}

/// Count and total size of `.dump` artifacts in date partitions.
fn artifact_totals(root: &Path) -> (usize, u64) {
    let mut count = 0;
    let mut bytes = 0;
    for entry in WalkDir::new(root)
        .min_depth(3)
        .max_depth(3)
        .into_iter()
        .filter_map(|entry| {
            entry
                .inspect_err(|err| debug!(root = %root.display(), error = %err, "skipping unreadable entry"))
                .ok()
        })
    {
        if !entry.file_type().is_file()
            || entry.path().extension().is_none_or(|ext| ext != DUMP_EXTENSION)
        {
            continue;
        }
        let in_partition = entry
            .path()
            .parent()
            .and_then(Path::parent)
            .and_then(Path::file_name)
            .and_then(|name| name.to_str())
            .and_then(parse_partition_name)
            .is_some();
        if in_partition {
            count += 1;
            bytes += entry.metadata().map_or(0, |meta| meta.len());
        }
    }
    (count, bytes)
}

/// Regular files in the log directory, sorted by name.
#[must_use]
pub fn list_log_files(log_dir: &Path) -> Vec<LogFileInfo> {
    let mut files: Vec<LogFileInfo> = readable_entries(log_dir)
        .into_iter()
        .filter_map(|entry| {
            let meta = entry.metadata().ok().filter(fs::Metadata::is_file)?;
            let name = entry.file_name().into_string().ok()?;
            #[allow(clippy::cast_precision_loss)]
            let size_kb = (meta.len() as f64 / 1024.0 * 100.0).round() / 100.0;
            Some(LogFileInfo {
                name,
                size_bytes: meta.len(),
                size_kb,
            })
        })
        .collect();
    files.sort_by(|a, b| a.name.cmp(&b.name));
    files
}

/// Entries of `dir`, skipping (and logging) anything that cannot be read.
fn readable_entries(dir: &Path) -> Vec<fs::DirEntry> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                debug!(dir = %dir.display(), error = %err, "cannot list directory");
            }
            return Vec::new();
        }
    };
    entries
        .filter_map(|entry| {
            entry
                .inspect_err(|err| debug!(dir = %dir.display(), error = %err, "skipping unreadable entry"))
                .ok()
        })
        .collect()
}

/// Main log files, oldest first.
fn main_log_files(log_dir: &Path) -> Vec<PathBuf> {
    let mut dated: Vec<_> = list_log_files(log_dir)
        .into_iter()
        .filter_map(|file| match parse_log_file_name(&file.name) {
            Some((LogFileKind::Main, date)) => Some((date, log_dir.join(file.name))),
            _ => None,
        })
        .collect();
    dated.sort();
    dated.into_iter().map(|(_, path)| path).collect()
}

fn count_events(log_dir: &Path) -> EventCounts {
    let mut counts = EventCounts::default();
    for path in main_log_files(log_dir) {
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        for line in content.lines() {
            match event_kind(line).as_deref() {
                Some("backup_success") => counts.success += 1,
                Some("backup_failed") => counts.failure += 1,
                _ => {}
            }
        }
    }
    counts
}

fn event_kind(line: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    value.get("event")?.as_str().map(str::to_string)
}

/// The last `limit` parseable records across the main log files.
#[must_use]
pub fn recent_entries(log_dir: &Path, limit: usize) -> Vec<LogRecord> {
    let mut newest_first = Vec::new();
    for path in main_log_files(log_dir).into_iter().rev() {
        if newest_first.len() >= limit {
            break;
        }
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        newest_first.extend(
            content
                .lines()
                .rev()
                .filter_map(|line| serde_json::from_str::<LogRecord>(line).ok())
                .take(limit - newest_first.len()),
        );
    }
    newest_first.reverse();
    newest_first
}

/// Raw contents of one file in the log directory.
///
/// `name` must be a bare file name; anything that could leave the
/// directory is reported as not found.
pub fn read_log(log_dir: &Path, name: &str) -> Result<String> {
    let not_found = || BackupError::LogNotFound(name.to_string());

    if name.is_empty() || name.contains(['/', '\\', '\0']) || name.contains("..") {
        return Err(not_found());
    }

    let path = log_dir.join(name);
    match fs::metadata(&path) {
        Ok(meta) if meta.is_file() => Ok(fs::read_to_string(&path)?),
        Ok(_) => Err(not_found()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(not_found()),
        Err(err) => Err(err.into()),
    }
}
