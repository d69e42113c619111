//! pgbackup - PostgreSQL backup orchestrator
//!
//! Dumps every database on a server with a single-run lock, a retention
//! window over old dumps and a JSON-lines event log.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use pgbackup::Result;
use pgbackup::app::AppContext;
use pgbackup::cli::output::{emit_json, robot_error_structured};
use pgbackup::cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.machine {
                // Machine mode: structured JSON error on stdout
                if emit_json(&robot_error_structured(&e)).is_err() {
                    eprintln!("Error: {e}");
                }
            } else {
                eprintln!("Error: {e}");
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let ctx = AppContext::from_cli(cli).inspect_err(|err| {
        if matches!(cli.command, Commands::Run(_)) {
            pgbackup::cli::commands::run::record_startup_error(err);
        }
    })?;
    pgbackup::cli::commands::run(&ctx, &cli.command)
}

fn init_tracing(cli: &Cli) {
    let filter = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn,pgbackup=info",
            1 => "info,pgbackup=debug",
            2 => "debug,pgbackup=trace",
            _ => "trace",
        }
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    if cli.machine {
        // JSON logging for machine mode
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        // Human-readable logging
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
