//! pgbackup logs - list log files or print one.

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json, robot_ok};
use crate::error::Result;
use crate::status::{list_log_files, read_log};

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Log file to print (a bare name from the listing)
    pub file: Option<String>,
}

pub fn run(ctx: &AppContext, args: &LogsArgs) -> Result<()> {
    let log_dir = &ctx.config.log.dir;

    let Some(name) = &args.file else {
        let files = list_log_files(log_dir);
        if ctx.robot_mode {
            return emit_json(&robot_ok(&files));
        }
        let mut layout = HumanLayout::new();
        layout.section(&format!("Log files in {}", log_dir.display()));
        if files.is_empty() {
            layout.bullet("(none)");
        }
        for file in &files {
            layout.bullet(&format!("{} ({:.2} KB)", file.name, file.size_kb));
        }
        emit_human(layout);
        return Ok(());
    };

    let content = read_log(log_dir, name)?;
    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({
            "file": name,
            "content": content,
        })));
    }
    print!("{content}");
    Ok(())
}
