//! CLI module - Command-line interface definitions and handlers
//!
//! Uses clap v4 with derive macros for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod commands;
pub mod output;

/// pgbackup - dump every PostgreSQL database with locking, retention and an event log
#[derive(Parser, Debug)]
#[command(name = "pgbackup")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable machine-readable JSON output on stdout.
    #[arg(long, short = 'm', global = true)]
    pub machine: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all diagnostics except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file path (default: ./pgbackup.toml, or $PGBACKUP_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Back up every database once
    Run(commands::run::RunArgs),

    /// Summarize backups on disk and recent log activity
    Status(commands::status::StatusArgs),

    /// List log files or print one of them
    Logs(commands::logs::LogsArgs),

    /// Remove a leftover lock marker
    Unlock(commands::unlock::UnlockArgs),
}
