pub mod app;
pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod pg;
pub mod status;
pub mod storage;

pub use error::{BackupError, Result};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
