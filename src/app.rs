//! Application context shared by every command.

use std::path::PathBuf;

use crate::cli::Cli;
use crate::config::Config;
use crate::error::Result;

/// Loaded configuration plus the global CLI switches.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: Config,
    pub config_path: Option<PathBuf>,
    /// JSON output on stdout instead of human-readable text.
    pub robot_mode: bool,
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config = Config::load(cli.config.as_deref())?;
        Ok(Self {
            config,
            config_path: cli.config.clone(),
            robot_mode: cli.machine,
        })
    }
}
