//! E2E test suite entry point.
//!
//! Drives the real binary against fake `psql`/`pg_dump` shell scripts.
#![cfg(unix)]

mod backup_workflow;
mod fixture;
mod maintenance_workflow;
mod reporting_workflow;
