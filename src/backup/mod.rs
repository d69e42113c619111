//! Backup run orchestration.
//!
//! A run takes the lock, sweeps expired date partitions, lists the databases
//! and dumps each of them in turn. Only configuration and enumeration
//! failures abort a run; the lock guard is released on every exit path.

pub mod retention;
pub mod sequencer;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::RunSettings;
use crate::error::{BackupError, Result};
use crate::events::{BackupEvent, EventSink};
use crate::pg::PgOperations;
use crate::storage::layout::BackupLayout;
use crate::storage::lock::RunLock;

pub use retention::{RetentionReport, sweep};
pub use sequencer::{BackupOutcome, DumpSequencer, OutcomeStatus};

/// How a run ended when it did not fail.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every target was attempted.
    Completed(RunSummary),
    /// Another run holds the lock; nothing was done.
    AlreadyRunning { lock_path: PathBuf, pid: Option<u32> },
}

/// Everything a completed run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub retention_deleted: Vec<PathBuf>,
    pub retention_failed: Vec<PathBuf>,
    pub outcomes: Vec<BackupOutcome>,
}

impl RunSummary {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

enum LockAttempt {
    Acquired(RunLock),
    Held { path: PathBuf, pid: Option<u32> },
}

/// Drives one backup run against a database server and an event sink.
pub struct Orchestrator<'a, P, S> {
    client: &'a P,
    sink: &'a S,
}

impl<'a, P: PgOperations, S: EventSink> Orchestrator<'a, P, S> {
    pub const fn new(client: &'a P, sink: &'a S) -> Self {
        Self { client, sink }
    }

    /// Execute one run.
    ///
    /// Returns `AlreadyRunning` without touching the server or the backup
    /// root when the lock marker is present. Enumeration failures are
    /// returned as errors after the lock has been released.
    pub fn run(&self, settings: &RunSettings) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let lock = match self.acquire_lock(settings)? {
            LockAttempt::Acquired(lock) => lock,
            LockAttempt::Held { path, pid } => {
                return Ok(RunOutcome::AlreadyRunning {
                    lock_path: path,
                    pid,
                });
            }
        };
        info!(lock = %lock.path().display(), "backup run started");
        self.sink.housekeeping();

        let retention = sweep(
            &settings.backup_root,
            settings.retention_days,
            Utc::now(),
            self.sink,
        );

        let targets = self.enumerate()?;

        let layout = BackupLayout::new(&settings.backup_root);
        let outcomes = DumpSequencer::new(self.client, self.sink, layout).run(targets);

        let summary = RunSummary {
            started_at,
            duration_ms: millis(clock.elapsed()),
            retention_deleted: retention.deleted,
            retention_failed: retention.failed,
            outcomes,
        };
        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "backup run finished"
        );

        drop(lock);
        Ok(RunOutcome::Completed(summary))
    }

    fn acquire_lock(&self, settings: &RunSettings) -> Result<LockAttempt> {
        let (path, pid) = match RunLock::acquire(&settings.lock_path) {
            Ok(lock) => return Ok(LockAttempt::Acquired(lock)),
            Err(BackupError::AlreadyRunning { path, pid }) => (path, pid),
            Err(err) => return Err(err),
        };

        if settings.reclaim_stale_lock {
            if let Some(stale) = RunLock::reclaim_if_stale(&path)? {
                self.sink.record(BackupEvent::StaleLockReclaimed {
                    lock_file: path.display().to_string(),
                    pid: stale.pid,
                });
                match RunLock::acquire(&path) {
                    Ok(lock) => return Ok(LockAttempt::Acquired(lock)),
                    // Lost a race with another run reclaiming the same marker.
                    Err(BackupError::AlreadyRunning { .. }) => {}
                    Err(err) => return Err(err),
                }
            }
        }

        warn!(lock = %path.display(), ?pid, "backup already running");
        self.sink.record(BackupEvent::BackupAlreadyRunning {
            message: "Backup already running, exiting".to_string(),
            lock_file: path.display().to_string(),
            pid,
        });
        Ok(LockAttempt::Held { path, pid })
    }

    fn enumerate(&self) -> Result<Vec<String>> {
        self.sink.record(BackupEvent::ListDatabasesStart);
        match self.client.list_databases() {
            Ok(databases) => {
                self.sink.record(BackupEvent::ListDatabasesSuccess {
                    count: databases.len(),
                });
                Ok(databases)
            }
            Err(err) => {
                self.sink.record(BackupEvent::ListDatabasesFailed {
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
