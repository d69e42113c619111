//! pgbackup status - backups on disk and recent activity.

use clap::Args;
use colored::Colorize;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json, robot_ok};
use crate::error::Result;
use crate::status::{DEFAULT_RECENT, StatusReport, StatusSources, collect};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Number of recent log entries to include
    #[arg(long, default_value_t = DEFAULT_RECENT)]
    pub recent: usize,
}

pub fn run(ctx: &AppContext, args: &StatusArgs) -> Result<()> {
    let sources = StatusSources {
        backup_root: &ctx.config.backup.dir,
        log_dir: &ctx.config.log.dir,
        lock_path: &ctx.config.backup.lock_file,
    };
    let report = collect(&sources, args.recent);

    if ctx.robot_mode {
        return emit_json(&robot_ok(&report));
    }
    emit_human(render(ctx, &report));
    Ok(())
}

fn render(ctx: &AppContext, report: &StatusReport) -> HumanLayout {
    let mut layout = HumanLayout::new();
    layout
        .title("pgbackup status")
        .kv("Server time", &report.server_time.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .kv("Backup root", &report.backup_root.display().to_string())
        .kv("Total backups", &report.total_backups.to_string())
        .kv("Total size", &format!("{:.2} MB", report.total_size_mb))
        .kv("Successes", &report.events.success.to_string())
        .kv("Failures", &report.events.failure.to_string());

    if let Some(path) = &ctx.config_path {
        layout.kv("Config", &path.display().to_string());
    }

    let lock_state = match &report.lock {
        None => "free".green().to_string(),
        Some(holder) if holder.alive => {
            let pid = holder.pid.map_or_else(|| "?".to_string(), |pid| pid.to_string());
            format!("{} (pid {pid})", "held".yellow())
        }
        Some(_) => format!("{} (run `pgbackup unlock`)", "stale".red()),
    };
    layout.kv("Lock", &lock_state);

    if !report.backup_dates.is_empty() {
        layout.blank().section("Backup dates");
        for date in &report.backup_dates {
            layout.bullet(date);
        }
    }

    layout.blank().section("Log files");
    if report.log_files.is_empty() {
        layout.bullet("(none)");
    }
    for file in &report.log_files {
        layout.bullet(&format!("{} ({:.2} KB)", file.name, file.size_kb));
    }

    if !report.recent.is_empty() {
        layout.blank().section("Recent events");
        for record in &report.recent {
            let mut line = format!(
                "{} {:5} {}",
                record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                record.level.to_string(),
                record.event.kind()
            );
            if let Some(database) = record.event.database() {
                line.push(' ');
                line.push_str(database);
            }
            layout.bullet(&line);
        }
    }

    layout
}
