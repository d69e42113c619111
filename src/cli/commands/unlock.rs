//! pgbackup unlock - remove a leftover lock marker.

use clap::Args;
use tracing::warn;

use crate::app::AppContext;
use crate::cli::output::{emit_json, robot_ok};
use crate::error::{BackupError, Result};
use crate::storage::lock::RunLock;

#[derive(Args, Debug)]
pub struct UnlockArgs {
    /// Remove the marker even if a live run still holds it
    #[arg(long)]
    pub force: bool,
}

pub fn run(ctx: &AppContext, args: &UnlockArgs) -> Result<()> {
    let lock_path = &ctx.config.backup.lock_file;

    let Some(holder) = RunLock::holder(lock_path)? else {
        if ctx.robot_mode {
            return emit_json(&robot_ok(serde_json::json!({
                "removed": false,
                "lock_file": lock_path.display().to_string(),
            })));
        }
        println!("No lock marker at {}", lock_path.display());
        return Ok(());
    };

    if holder.alive && !args.force {
        return Err(BackupError::AlreadyRunning {
            path: holder.path,
            pid: holder.pid,
        });
    }
    if holder.alive {
        warn!(pid = ?holder.pid, "forcing removal of a lock held by a live run");
    }

    let removed = RunLock::release_path(lock_path)?;
    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({
            "removed": removed,
            "lock_file": lock_path.display().to_string(),
            "holder": holder,
        })));
    }
    println!("Removed lock marker {}", lock_path.display());
    Ok(())
}
