//! Sequential dump of every target in a run.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::error::DumpError;
use crate::events::{BackupEvent, EventSink, bytes_to_mb};
use crate::pg::PgOperations;
use crate::storage::layout::BackupLayout;

/// Result of one dump attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success {
        path: PathBuf,
        size_bytes: u64,
    },
    Failure {
        #[serde(serialize_with = "serialize_display")]
        error: DumpError,
    },
}

/// One attempt, success or failure, for one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupOutcome {
    pub database: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BackupOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success { .. })
    }

    /// Artifact path of a successful attempt.
    #[must_use]
    pub fn artifact(&self) -> Option<&PathBuf> {
        match &self.status {
            OutcomeStatus::Success { path, .. } => Some(path),
            OutcomeStatus::Failure { .. } => None,
        }
    }
}

/// Drains a queue of targets one dump at a time.
pub struct DumpSequencer<'a, P, S> {
    client: &'a P,
    sink: &'a S,
    layout: BackupLayout,
}

impl<'a, P: PgOperations, S: EventSink> DumpSequencer<'a, P, S> {
    pub const fn new(client: &'a P, sink: &'a S, layout: BackupLayout) -> Self {
        Self {
            client,
            sink,
            layout,
        }
    }

    /// Dump every target in order, returning one outcome per target.
    ///
    /// A failed dump is recorded and the next target is attempted; nothing
    /// here aborts the run.
    pub fn run(&self, targets: Vec<String>) -> Vec<BackupOutcome> {
        let started = Instant::now();
        let mut queue: VecDeque<String> = targets.into();
        let mut outcomes = Vec::with_capacity(queue.len());

        while let Some(database) = queue.pop_front() {
            let outcome = self.dump_one(database);
            debug!(remaining = queue.len(), "dump finished");
            outcomes.push(outcome);
        }

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        self.sink.record(BackupEvent::BackupAllComplete {
            succeeded,
            failed: outcomes.len() - succeeded,
            duration_ms: duration_ms(started.elapsed()),
        });
        outcomes
    }

    fn dump_one(&self, database: String) -> BackupOutcome {
        let started_at = Utc::now();
        self.sink.record(BackupEvent::BackupStart {
            database: database.clone(),
        });

        let clock = Instant::now();
        let result = self.attempt(&database, started_at);
        let duration = clock.elapsed();
        let elapsed_ms = duration_ms(duration);

        let status = match result {
            Ok((path, size_bytes)) => {
                self.sink.record(BackupEvent::BackupSuccess {
                    database: database.clone(),
                    file: artifact_name(&path),
                    size_mb: bytes_to_mb(size_bytes),
                    duration_ms: elapsed_ms,
                });
                OutcomeStatus::Success { path, size_bytes }
            }
            Err(error) => {
                self.sink.record(BackupEvent::BackupFailed {
                    database: database.clone(),
                    error: error.to_string(),
                    duration_ms: elapsed_ms,
                });
                OutcomeStatus::Failure { error }
            }
        };

        BackupOutcome {
            database,
            status,
            duration,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn attempt(&self, database: &str, at: DateTime<Utc>) -> Result<(PathBuf, u64), DumpError> {
        let path = self
            .layout
            .prepare_artifact(database, at)
            .map_err(|err| DumpError::Prepare {
                path: self.layout.database_dir(at.date_naive(), database),
                reason: err.to_string(),
            })?;

        if let Err(err) = self.client.dump_database(database, &path) {
            discard_partial(&path);
            return Err(err);
        }

        let size = fs::metadata(&path)
            .map_err(|err| DumpError::MissingOutput {
                path: path.clone(),
                reason: err.to_string(),
            })?
            .len();
        Ok((path, size))
    }
}

/// Remove whatever a failed dump left at `path`. Only successful dumps
/// produce artifacts.
fn discard_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed partial dump output"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => debug!(path = %path.display(), error = %err, "cannot remove partial dump output"),
    }
}

fn artifact_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

fn serialize_display<S: Serializer>(error: &DumpError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration_ms(*duration))
}

/// Milliseconds for an event, rounded up so a finished attempt never reads 0.
fn duration_ms(duration: Duration) -> u64 {
    let millis = duration.as_nanos().div_ceil(1_000_000);
    u64::try_from(millis).unwrap_or(u64::MAX).max(1)
}
