//! Mock PgClient for testing.
//!
//! Serves a fixed database list and scripted dump outcomes without spawning
//! any subprocess, and records every call for later assertions.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use parking_lot::Mutex;

use crate::error::{BackupError, DumpError, Result};

use super::PgOperations;

/// What a mocked dump does for one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpBehavior {
    /// Write an artifact of this many bytes and succeed.
    Succeed { bytes: u64 },

    /// Succeed without writing anything.
    SucceedWithoutFile,

    /// Fail with this error and leave no artifact.
    Fail(DumpError),

    /// Write `bytes` of output, then fail like an interrupted `pg_dump`.
    FailAfterWriting { bytes: u64, error: DumpError },
}

impl Default for DumpBehavior {
    fn default() -> Self {
        Self::Succeed { bytes: 1024 }
    }
}

/// In-memory stand-in for [`super::PgClient`].
#[derive(Debug, Default)]
pub struct MockPgClient {
    databases: Vec<String>,
    list_error: Option<String>,
    behaviors: HashMap<String, DumpBehavior>,
    list_calls: Mutex<usize>,
    dumped: Mutex<Vec<String>>,
}

impl MockPgClient {
    /// Mock that lists `databases` and dumps each of them successfully.
    pub fn new<I, S>(databases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            databases: databases.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Mock whose listing always fails with `message`.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            list_error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Script the dump of one database.
    #[must_use]
    pub fn with_behavior(mut self, database: impl Into<String>, behavior: DumpBehavior) -> Self {
        self.behaviors.insert(database.into(), behavior);
        self
    }

    /// Make the dump of `database` exit unsuccessfully.
    #[must_use]
    pub fn failing(self, database: impl Into<String>) -> Self {
        self.with_behavior(
            database,
            DumpBehavior::Fail(DumpError::ExitStatus {
                program: "pg_dump".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "mock dump failure".to_string(),
            }),
        )
    }

    /// Number of times `list_databases` was called.
    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock()
    }

    /// Databases passed to `dump_database`, in call order.
    pub fn dumped(&self) -> Vec<String> {
        self.dumped.lock().clone()
    }

    /// Total number of calls of either kind.
    pub fn total_calls(&self) -> usize {
        self.list_calls() + self.dumped.lock().len()
    }
}

impl PgOperations for MockPgClient {
    fn list_databases(&self) -> Result<Vec<String>> {
        *self.list_calls.lock() += 1;
        match &self.list_error {
            Some(message) => Err(BackupError::Enumeration(message.clone())),
            None => Ok(self.databases.clone()),
        }
    }

    fn dump_database(&self, database: &str, destination: &Path) -> std::result::Result<(), DumpError> {
        self.dumped.lock().push(database.to_string());

        match self.behaviors.get(database).cloned().unwrap_or_default() {
            DumpBehavior::Succeed { bytes } => write_output(destination, bytes),
            DumpBehavior::SucceedWithoutFile => Ok(()),
            DumpBehavior::Fail(err) => Err(err),
            DumpBehavior::FailAfterWriting { bytes, error } => {
                write_output(destination, bytes)?;
                Err(error)
            }
        }
    }
}

fn write_output(destination: &Path, bytes: u64) -> std::result::Result<(), DumpError> {
    let prepare = |err: std::io::Error| DumpError::Prepare {
        path: destination.to_path_buf(),
        reason: err.to_string(),
    };
    fs::File::create(destination)
        .map_err(prepare)?
        .set_len(bytes)
        .map_err(prepare)
}
