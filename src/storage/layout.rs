//! On-disk layout of backup output.
//!
//! `{root}/{YYYY-MM-DD}/{database}/{database}-{timestamp}.dump`

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};

pub const PARTITION_FORMAT: &str = "%Y-%m-%d";
pub const DUMP_EXTENSION: &str = "dump";

/// Paths under one backup root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupLayout {
    root: PathBuf,
}

impl BackupLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every artifact written on `date`.
    #[must_use]
    pub fn partition_dir(&self, date: NaiveDate) -> PathBuf {
        self.root.join(date.format(PARTITION_FORMAT).to_string())
    }

    /// Directory holding the artifacts of one database on `date`.
    #[must_use]
    pub fn database_dir(&self, date: NaiveDate, database: &str) -> PathBuf {
        self.partition_dir(date).join(path_component(database))
    }

    /// Create the database directory and pick an unused artifact path.
    ///
    /// The timestamp has microsecond resolution; if a file with that name
    /// exists anyway, a numeric suffix is added.
    pub fn prepare_artifact(&self, database: &str, at: DateTime<Utc>) -> io::Result<PathBuf> {
        let dir = self.database_dir(at.date_naive(), database);
        fs::create_dir_all(&dir)?;

        let base = format!("{}-{}", path_component(database), timestamp_component(at));
        let mut candidate = dir.join(format!("{base}.{DUMP_EXTENSION}"));
        let mut suffix = 1u32;
        while candidate.exists() {
            candidate = dir.join(format!("{base}-{suffix}.{DUMP_EXTENSION}"));
            suffix += 1;
        }
        Ok(candidate)
    }
}

/// UTC instant formatted for use in a file name (`:` and `.` become `-`).
#[must_use]
pub fn timestamp_component(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H-%M-%S-%6fZ").to_string()
}

/// Parse a date partition directory name.
#[must_use]
pub fn parse_partition_name(name: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(name, PARTITION_FORMAT)
        .ok()
        .filter(|date| date.format(PARTITION_FORMAT).to_string() == name)
}

/// Make a database name safe to use as a single path component.
///
/// PostgreSQL accepts `/` and `..` in identifiers; those would escape the
/// partition directory.
#[must_use]
pub fn path_component(database: &str) -> String {
    let cleaned: String = database
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".repeat(cleaned.len().max(1)),
        _ => cleaned,
    }
}
