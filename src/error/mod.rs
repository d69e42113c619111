//! Error handling for pgbackup.
//!
//! This module provides:
//! - [`BackupError`]: The error enum for everything that can abort a command
//! - [`DumpError`]: Per-database dump failures, recorded and never propagated
//! - [`ErrorCode`]: Standardized error codes for machine parsing
//! - [`StructuredError`]: Serializable error emitted in machine mode

mod codes;

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use codes::ErrorCode;

/// Main error type for pgbackup operations.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing required config: {0}")]
    MissingConfig(String),

    #[error("Backup already running (lock marker at {})", .path.display())]
    AlreadyRunning { path: PathBuf, pid: Option<u32> },

    #[error("Lock failed: {0}")]
    LockFailed(String),

    #[error("Listing databases failed: {0}")]
    Enumeration(String),

    #[error("Log file not found: {0}")]
    LogNotFound(String),

    #[error("Interrupted by {0}")]
    Interrupted(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BackupError {
    /// Get the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Config(_) => ErrorCode::ConfigInvalid,
            Self::MissingConfig(_) => ErrorCode::ConfigMissingRequired,
            Self::AlreadyRunning { .. } => ErrorCode::AlreadyRunning,
            Self::LockFailed(_) => ErrorCode::LockFailed,
            Self::Enumeration(_) => ErrorCode::EnumerationFailed,
            Self::LogNotFound(_) => ErrorCode::LogNotFound,
            Self::Interrupted(_) => ErrorCode::Interrupted,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::SerializationError,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// True for failures that happen before a run owns the lock.
    #[must_use]
    pub const fn is_startup(&self) -> bool {
        matches!(self, Self::Config(_) | Self::MissingConfig(_))
    }

    /// Process exit status for a command that failed with this error.
    ///
    /// Signal interruptions follow the shell convention of 128 + signal
    /// number; everything else is 1.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Interrupted(signal) if signal == "SIGINT" => 130,
            Self::Interrupted(_) => 143,
            _ => 1,
        }
    }

    /// Get context information for this error as JSON.
    #[must_use]
    pub fn context(&self) -> Option<Value> {
        match self {
            Self::MissingConfig(key) => Some(serde_json::json!({ "config_key": key })),
            Self::AlreadyRunning { path, pid } => Some(serde_json::json!({
                "lock_file": path.display().to_string(),
                "pid": pid,
            })),
            Self::LogNotFound(name) => Some(serde_json::json!({ "file": name })),
            _ => None,
        }
    }

    /// Convert this error to a structured error.
    #[must_use]
    pub fn to_structured(&self) -> StructuredError {
        StructuredError::from_backup_error(self)
    }
}

/// Why a single database dump failed.
///
/// The sequencer records these in the failure event and moves on to the next
/// target; they never escape a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DumpError {
    #[error("failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{program} exited with {status}: {stderr}")]
    ExitStatus {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} exceeded the {timeout_secs}s dump timeout and was killed")]
    Timeout { program: String, timeout_secs: u64 },

    #[error("dump reported success but {} is missing: {reason}", .path.display())]
    MissingOutput { path: PathBuf, reason: String },

    #[error("cannot prepare {}: {reason}", .path.display())]
    Prepare { path: PathBuf, reason: String },
}

/// A structured error with machine-readable code, suggestion, and context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// The error code (e.g., "ALREADY_RUNNING")
    pub code: ErrorCode,

    /// The numeric error code (e.g., 201)
    pub numeric_code: u16,

    /// Human-readable error message
    pub message: String,

    /// Actionable suggestion for recovery
    pub suggestion: String,

    /// Additional context for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    /// Whether this error is potentially recoverable by the user
    pub recoverable: bool,

    /// Error category (e.g., "config", "lock")
    pub category: String,
}

impl StructuredError {
    /// Create a new structured error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            numeric_code: code.numeric(),
            message: message.into(),
            suggestion: code.suggestion().to_string(),
            context: None,
            recoverable: code.is_recoverable(),
            category: code.category().to_string(),
            code,
        }
    }

    /// Create a structured error from a `BackupError`.
    #[must_use]
    pub fn from_backup_error(err: &BackupError) -> Self {
        let mut structured = Self::new(err.code(), err.to_string());
        structured.context = err.context();
        structured
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<&BackupError> for StructuredError {
    fn from(err: &BackupError) -> Self {
        Self::from_backup_error(err)
    }
}

/// Result type alias using `BackupError`.
pub type Result<T> = std::result::Result<T, BackupError>;
