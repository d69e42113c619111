//! CLI command implementations
//!
//! Each subcommand has its own module with:
//! - Args struct for command-line arguments
//! - `run()` function to execute the command

use crate::app::AppContext;
use crate::cli::Commands;
use crate::error::Result;

pub mod logs;
pub mod run;
pub mod status;
pub mod unlock;

/// Dispatch a command to its handler
pub fn run(ctx: &AppContext, command: &Commands) -> Result<()> {
    match command {
        Commands::Run(args) => run::run(ctx, args),
        Commands::Status(args) => status::run(ctx, args),
        Commands::Logs(args) => logs::run(ctx, args),
        Commands::Unlock(args) => unlock::run(ctx, args),
    }
}
