//! Date-partitioned JSON-lines event log.
//!
//! Every event goes to `pg-backup-YYYY-MM-DD.log`; error-level events are
//! also copied to `pg-backup-error-YYYY-MM-DD.log`. Files older than the
//! configured number of days are pruned by [`EventSink::housekeeping`], which
//! the orchestrator calls only once it owns the run lock.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::types::{BackupEvent, Level, LogRecord};
use super::EventSink;

const MAIN_PREFIX: &str = "pg-backup-";
const ERROR_PREFIX: &str = "pg-backup-error-";
const SUFFIX: &str = ".log";

/// Which stream a log file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFileKind {
    /// Every event
    Main,
    /// Error-level events only
    Error,
}

/// Parse `pg-backup-[error-]YYYY-MM-DD.log` into its kind and date.
#[must_use]
pub fn parse_log_file_name(name: &str) -> Option<(LogFileKind, NaiveDate)> {
    let stem = name.strip_suffix(SUFFIX)?;
    let (kind, date) = if let Some(date) = stem.strip_prefix(ERROR_PREFIX) {
        (LogFileKind::Error, date)
    } else {
        (LogFileKind::Main, stem.strip_prefix(MAIN_PREFIX)?)
    };
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .map(|date| (kind, date))
}

/// File-backed event sink.
#[derive(Debug)]
pub struct EventLog {
    dir: PathBuf,
    retention_days: u32,
    // Serializes appends so concurrent emitters never interleave lines.
    write_lock: Mutex<()>,
}

impl EventLog {
    /// Open the log directory, creating it if needed.
    ///
    /// Never fails: problems are reported through `tracing` and later
    /// `emit` calls degrade to tracing-only output. Existing files are left
    /// alone until [`EventLog::prune`] runs.
    pub fn open(dir: impl Into<PathBuf>, retention_days: u32) -> Self {
        let dir = dir.into();
        if let Err(err) = fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %err, "cannot create log directory");
        }
        Self {
            dir,
            retention_days,
            write_lock: Mutex::new(()),
        }
    }

    /// Remove log files older than the retention window.
    pub fn prune(&self) {
        let _guard = self.write_lock.lock();
        prune_expired(&self.dir, self.retention_days, Utc::now().date_naive());
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file receiving events of `kind` on `date`.
    #[must_use]
    pub fn file_for(&self, kind: LogFileKind, date: NaiveDate) -> PathBuf {
        let prefix = match kind {
            LogFileKind::Main => MAIN_PREFIX,
            LogFileKind::Error => ERROR_PREFIX,
        };
        self.dir
            .join(format!("{prefix}{}{SUFFIX}", date.format("%Y-%m-%d")))
    }

    fn append(&self, record: &LogRecord) -> io::Result<()> {
        let mut line = serde_json::to_string(record).map_err(io::Error::other)?;
        line.push('\n');

        let date = record.timestamp.date_naive();
        let _guard = self.write_lock.lock();
        append_line(&self.file_for(LogFileKind::Main, date), &line)?;
        if record.level == Level::Error {
            append_line(&self.file_for(LogFileKind::Error, date), &line)?;
        }
        Ok(())
    }
}

impl EventSink for EventLog {
    fn emit(&self, level: Level, event: &BackupEvent) {
        let record = LogRecord::new(level, event.clone());
        mirror_to_tracing(&record);
        if let Err(err) = self.append(&record) {
            debug!(dir = %self.dir.display(), error = %err, "event log write failed");
        }
    }

    fn housekeeping(&self) {
        self.prune();
    }
}

fn append_line(path: &Path, line: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())
}

fn mirror_to_tracing(record: &LogRecord) {
    let kind = record.event.kind();
    let database = record.event.database().unwrap_or_default();
    let fields = serde_json::to_string(&record.event).unwrap_or_default();
    match record.level {
        Level::Info => info!(event = kind, database, %fields, "backup event"),
        Level::Warn => warn!(event = kind, database, %fields, "backup event"),
        Level::Error => error!(event = kind, database, %fields, "backup event"),
    }
}

fn prune_expired(dir: &Path, retention_days: u32, today: NaiveDate) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(dir = %dir.display(), error = %err, "cannot list log directory");
            return;
        }
    };
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(dir = %dir.display(), error = %err, "skipping unreadable log entry");
                continue;
            }
        };
        let name = entry.file_name();
        let Some((_, date)) = name.to_str().and_then(parse_log_file_name) else {
            continue;
        };
        if (today - date).num_days() > i64::from(retention_days) {
            match fs::remove_file(entry.path()) {
                Ok(()) => debug!(file = %entry.path().display(), "pruned expired log file"),
                Err(err) => debug!(file = %entry.path().display(), error = %err, "cannot prune log file"),
            }
        }
    }
}
