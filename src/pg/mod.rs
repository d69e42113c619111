//! PostgreSQL client tooling.
//!
//! Listing and dumping go through the `psql` and `pg_dump` binaries; the
//! [`PgOperations`] trait is the seam the orchestrator depends on, so tests
//! can substitute [`MockPgClient`].

mod client;
mod mock;

use std::path::Path;

use crate::error::{DumpError, Result};

pub use client::{LIST_DATABASES_QUERY, PgClient, parse_database_list};
pub use mock::{DumpBehavior, MockPgClient};

/// Operations the orchestrator needs from the database server.
pub trait PgOperations {
    /// List backup-eligible databases in a deterministic order.
    ///
    /// Fails with `BackupError::Enumeration` when the listing command cannot
    /// run or exits unsuccessfully.
    fn list_databases(&self) -> Result<Vec<String>>;

    /// Dump one database to `destination`.
    fn dump_database(&self, database: &str, destination: &Path) -> std::result::Result<(), DumpError>;
}

impl<T: PgOperations + ?Sized> PgOperations for &T {
    fn list_databases(&self) -> Result<Vec<String>> {
        (**self).list_databases()
    }

    fn dump_database(&self, database: &str, destination: &Path) -> std::result::Result<(), DumpError> {
        (**self).dump_database(database, destination)
    }
}
