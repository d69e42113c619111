//! Event record types written to the structured log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One lifecycle or outcome event, tagged by its `event` kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BackupEvent {
    StartupError {
        message: String,
    },
    BackupAlreadyRunning {
        message: String,
        #[serde(rename = "lockFile")]
        lock_file: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pid: Option<u32>,
    },
    StaleLockReclaimed {
        #[serde(rename = "lockFile")]
        lock_file: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pid: Option<u32>,
    },
    ListDatabasesStart,
    ListDatabasesSuccess {
        count: usize,
    },
    ListDatabasesFailed {
        error: String,
    },
    BackupRetentionCleanup {
        deleted: String,
    },
    BackupRetentionFailed {
        directory: String,
        error: String,
    },
    BackupStart {
        database: String,
    },
    BackupSuccess {
        database: String,
        file: String,
        #[serde(rename = "sizeMB")]
        size_mb: f64,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
    BackupFailed {
        database: String,
        error: String,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
    BackupAllComplete {
        succeeded: usize,
        failed: usize,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
    BackupInterrupted {
        signal: String,
    },
}

impl BackupEvent {
    /// The `event` tag as written to the log.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StartupError { .. } => "startup_error",
            Self::BackupAlreadyRunning { .. } => "backup_already_running",
            Self::StaleLockReclaimed { .. } => "stale_lock_reclaimed",
            Self::ListDatabasesStart => "list_databases_start",
            Self::ListDatabasesSuccess { .. } => "list_databases_success",
            Self::ListDatabasesFailed { .. } => "list_databases_failed",
            Self::BackupRetentionCleanup { .. } => "backup_retention_cleanup",
            Self::BackupRetentionFailed { .. } => "backup_retention_failed",
            Self::BackupStart { .. } => "backup_start",
            Self::BackupSuccess { .. } => "backup_success",
            Self::BackupFailed { .. } => "backup_failed",
            Self::BackupAllComplete { .. } => "backup_all_complete",
            Self::BackupInterrupted { .. } => "backup_interrupted",
        }
    }

    /// Level used when the caller has no reason to override it.
    #[must_use]
    pub const fn default_level(&self) -> Level {
        match self {
            Self::StartupError { .. }
            | Self::ListDatabasesFailed { .. }
            | Self::BackupFailed { .. }
            | Self::BackupRetentionFailed { .. } => Level::Error,
            Self::BackupAlreadyRunning { .. }
            | Self::StaleLockReclaimed { .. }
            | Self::BackupInterrupted { .. } => Level::Warn,
            _ => Level::Info,
        }
    }

    /// Database named by the event, if any.
    #[must_use]
    pub fn database(&self) -> Option<&str> {
        match self {
            Self::BackupStart { database }
            | Self::BackupSuccess { database, .. }
            | Self::BackupFailed { database, .. } => Some(database),
            _ => None,
        }
    }
}

/// A single line of the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    #[serde(flatten)]
    pub event: BackupEvent,
}

impl LogRecord {
    #[must_use]
    pub fn new(level: Level, event: BackupEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            event,
        }
    }
}

/// Convert a byte count to megabytes rounded to two decimals.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bytes_to_mb(bytes: u64) -> f64 {
    let mb = bytes as f64 / 1024.0 / 1024.0;
    (mb * 100.0).round() / 100.0
}
