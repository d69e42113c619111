//! pgbackup run - one backup pass over every database.
//!
//! The orchestrator runs on a blocking worker thread while a current-thread
//! runtime waits for SIGINT/SIGTERM. A signal releases the lock marker and
//! ends the command with `BackupError::Interrupted`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use colored::Colorize;
use tracing::{info, warn};

use crate::app::AppContext;
use crate::backup::{Orchestrator, OutcomeStatus, RunOutcome, RunSummary};
use crate::cli::output::{HumanLayout, emit_human, emit_json, robot_ok};
use crate::config::{LogConfig, RunSettings};
use crate::error::{BackupError, Result};
use crate::events::{BackupEvent, EventLog, EventSink, bytes_to_mb};
use crate::pg::PgClient;
use crate::storage::lock::RunLock;

#[derive(Args, Debug, Default)]
pub struct RunArgs {}

pub fn run(ctx: &AppContext, _args: &RunArgs) -> Result<()> {
    let log = Arc::new(EventLog::open(
        &ctx.config.log.dir,
        ctx.config.log.retention_days,
    ));

    let settings = ctx.config.validate().inspect_err(|err| {
        log.record(BackupEvent::StartupError {
            message: err.to_string(),
        });
    })?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(supervise(settings, Arc::clone(&log)));
    // A worker still blocked on pg_dump must not hold up process exit.
    runtime.shutdown_background();

    match result? {
        RunOutcome::Completed(summary) => report_summary(ctx, &summary),
        RunOutcome::AlreadyRunning { lock_path, pid } => {
            report_already_running(ctx, &lock_path, pid)
        }
    }
}

/// Record a startup failure that happened before any config was available.
///
/// Used when loading the configuration itself fails; the log goes to
/// `$BACKUP_LOG_DIR` or the default log directory.
pub fn record_startup_error(err: &BackupError) {
    let defaults = LogConfig::default();
    let dir = std::env::var_os("BACKUP_LOG_DIR").map_or(defaults.dir, PathBuf::from);
    EventLog::open(dir, defaults.retention_days).record(BackupEvent::StartupError {
        message: err.to_string(),
    });
}

async fn supervise(settings: RunSettings, log: Arc<EventLog>) -> Result<RunOutcome> {
    let lock_path = settings.lock_path.clone();
    let worker_log = Arc::clone(&log);
    let worker = tokio::task::spawn_blocking(move || {
        let client = PgClient::from(&settings);
        Orchestrator::new(&client, worker_log.as_ref()).run(&settings)
    });

    tokio::select! {
        joined = worker => joined
            .map_err(|err| BackupError::Internal(format!("backup worker failed: {err}")))?,
        signal = shutdown_signal() => {
            interrupt(&lock_path, &log, signal);
            Err(BackupError::Interrupted(signal.to_string()))
        }
    }
}

fn interrupt(lock_path: &Path, log: &EventLog, signal: &str) {
    warn!(signal, "interrupted, releasing run lock");
    match RunLock::release_if_owned(lock_path) {
        Ok(true) => info!(lock = %lock_path.display(), "run lock released"),
        Ok(false) => {}
        Err(err) => warn!(lock = %lock_path.display(), error = %err, "failed to release run lock"),
    }
    log.record(BackupEvent::BackupInterrupted {
        signal: signal.to_string(),
    });
}

/// Resolve on the first SIGINT or SIGTERM, naming the signal.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => "SIGINT",
        () = terminate => "SIGTERM",
    }
}

fn report_summary(ctx: &AppContext, summary: &RunSummary) -> Result<()> {
    if ctx.robot_mode {
        return emit_json(&robot_ok(summary));
    }

    let mut layout = HumanLayout::new();
    layout
        .title("Backup complete")
        .kv("Succeeded", &summary.succeeded().to_string())
        .kv("Failed", &summary.failed().to_string())
        .kv("Duration", &format!("{} ms", summary.duration_ms));
    if !summary.retention_deleted.is_empty() {
        layout.kv(
            "Expired removed",
            &summary.retention_deleted.len().to_string(),
        );
    }

    if !summary.outcomes.is_empty() {
        layout.blank().section("Databases");
        for outcome in &summary.outcomes {
            let line = match &outcome.status {
                OutcomeStatus::Success { path, size_bytes } => format!(
                    "{} {} -> {} ({:.2} MB)",
                    "ok".green(),
                    outcome.database,
                    path.display(),
                    bytes_to_mb(*size_bytes)
                ),
                OutcomeStatus::Failure { error } => {
                    format!("{} {}: {error}", "FAILED".red(), outcome.database)
                }
            };
            layout.bullet(&line);
        }
    }

    emit_human(layout);
    Ok(())
}

fn report_already_running(ctx: &AppContext, lock_path: &Path, pid: Option<u32>) -> Result<()> {
    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({
            "already_running": true,
            "lock_file": lock_path.display().to_string(),
            "pid": pid,
        })));
    }

    let owner = pid.map_or_else(String::new, |pid| format!(" by pid {pid}"));
    println!(
        "{} lock marker {} is held{owner}; nothing to do",
        "Backup already running:".yellow(),
        lock_path.display()
    );
    Ok(())
}
