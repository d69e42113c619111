//! Retention sweep over date partitions.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use tracing::{debug, warn};

use crate::events::{BackupEvent, EventSink};
use crate::storage::layout::parse_partition_name;

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// Partition directories removed.
    pub deleted: Vec<PathBuf>,
    /// Partition directories that could not be removed.
    pub failed: Vec<PathBuf>,
}

/// Time elapsed since the start (UTC midnight) of a partition's date.
#[must_use]
pub fn partition_age(partition: NaiveDate, now: DateTime<Utc>) -> Duration {
    now - partition.and_time(NaiveTime::MIN).and_utc()
}

/// Whether a partition is past the retention window at `now`.
///
/// A partition dated D with a window of N days expires as soon as day D+N
/// begins.
#[must_use]
pub fn is_expired(partition: NaiveDate, now: DateTime<Utc>, retention_days: u32) -> bool {
    partition_age(partition, now) > Duration::days(i64::from(retention_days))
}

/// Remove every date partition under `root` older than `retention_days`.
///
/// Only immediate child directories named `YYYY-MM-DD` are considered.
/// Failures are reported through `sink` and never stop the sweep.
pub fn sweep<S: EventSink>(
    root: &Path,
    retention_days: u32,
    now: DateTime<Utc>,
    sink: &S,
) -> RetentionReport {
    sweep_with(root, retention_days, now, sink, |dir| fs::remove_dir_all(dir))
}

fn sweep_with<S, F>(
    root: &Path,
    retention_days: u32,
    now: DateTime<Utc>,
    sink: &S,
    remove: F,
) -> RetentionReport
where
    S: EventSink,
    F: Fn(&Path) -> io::Result<()>,
{
    let mut report = RetentionReport::default();

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(root = %root.display(), "backup root missing, nothing to sweep");
            return report;
        }
        Err(err) => {
            warn!(root = %root.display(), error = %err, "cannot read backup root");
            sink.record(BackupEvent::BackupRetentionFailed {
                directory: root.display().to_string(),
                error: err.to_string(),
            });
            return report;
        }
    };

    let mut expired: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!(root = %root.display(), error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_ok_and(|ty| ty.is_dir()))
        .filter_map(|entry| {
            let name = entry.file_name();
            let date = parse_partition_name(name.to_str()?)?;
            is_expired(date, now, retention_days).then(|| entry.path())
        })
        .collect();
    expired.sort();

    for dir in expired {
        match remove(&dir) {
            Ok(()) => {
                sink.record(BackupEvent::BackupRetentionCleanup {
                    deleted: dir.display().to_string(),
                });
                report.deleted.push(dir);
            }
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "cannot remove expired partition");
                sink.record(BackupEvent::BackupRetentionFailed {
                    directory: dir.display().to_string(),
                    error: err.to_string(),
                });
                report.failed.push(dir);
            }
        }
    }

    report
}
