//! Standardized error codes for machine-parseable output.
//!
//! Error codes follow a numeric taxonomy:
//! - 1xx: Config errors
//! - 2xx: Lock errors
//! - 3xx: Server errors (enumeration, dump)
//! - 4xx: Storage errors
//! - 9xx: Internal errors

use serde::{Deserialize, Serialize};

/// Standardized error codes for machine mode output.
///
/// Each variant maps to a numeric code (e.g., `ConfigMissingRequired` -> E102).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================
    // Config errors (1xx)
    // ========================================
    /// E101: Config file or environment value is malformed
    ConfigInvalid,
    /// E102: Required config value is missing
    ConfigMissingRequired,

    // ========================================
    // Lock errors (2xx)
    // ========================================
    /// E201: Another run holds the lock marker
    AlreadyRunning,
    /// E202: Lock marker could not be created or removed
    LockFailed,

    // ========================================
    // Server errors (3xx)
    // ========================================
    /// E301: Listing databases failed
    EnumerationFailed,

    // ========================================
    // Storage errors (4xx)
    // ========================================
    /// E401: Requested log file does not exist
    LogNotFound,
    /// E402: IO operation failed
    IoError,
    /// E403: Serialization/deserialization failed
    SerializationError,

    // ========================================
    // Internal errors (9xx)
    // ========================================
    /// E901: Run was interrupted by a signal
    Interrupted,
    /// E902: Unexpected internal error
    InternalError,
}

impl ErrorCode {
    /// Get the numeric error code (e.g., `AlreadyRunning` -> 201).
    #[must_use]
    pub const fn numeric(&self) -> u16 {
        match self {
            Self::ConfigInvalid => 101,
            Self::ConfigMissingRequired => 102,

            Self::AlreadyRunning => 201,
            Self::LockFailed => 202,

            Self::EnumerationFailed => 301,

            Self::LogNotFound => 401,
            Self::IoError => 402,
            Self::SerializationError => 403,

            Self::Interrupted => 901,
            Self::InternalError => 902,
        }
    }

    /// Get the error code as a formatted string (e.g., "E201").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("E{}", self.numeric())
    }

    /// Get the default suggestion for this error code.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::ConfigInvalid => "Check the value in pgbackup.toml or the matching environment variable",
            Self::ConfigMissingRequired => "Set PG_HOST, PG_USER and PG_PASSWORD in the environment or config file",
            Self::AlreadyRunning => "Wait for the active run to finish. If no run is active, remove the marker with `pgbackup unlock`",
            Self::LockFailed => "Check write permissions on the working directory holding the lock marker",
            Self::EnumerationFailed => "Verify the server is reachable and the credentials are valid with `psql -h HOST -U USER -l`",
            Self::LogNotFound => "Run `pgbackup logs` to list available log files",
            Self::IoError => "Check file permissions and available disk space",
            Self::SerializationError => "This is likely a bug; please report it with the failing input",
            Self::Interrupted => "The lock was released; start a new run when ready",
            Self::InternalError => "This is likely a bug; please report it",
        }
    }

    /// Check if this error is potentially recoverable by the user.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::SerializationError | Self::InternalError)
    }

    /// Get the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self.numeric() / 100 {
            1 => "config",
            2 => "lock",
            3 => "server",
            4 => "storage",
            9 => "internal",
            _ => "unknown",
        }
    }

    /// Iterate over all error codes.
    pub fn all() -> impl Iterator<Item = Self> {
        [
            Self::ConfigInvalid,
            Self::ConfigMissingRequired,
            Self::AlreadyRunning,
            Self::LockFailed,
            Self::EnumerationFailed,
            Self::LogNotFound,
            Self::IoError,
            Self::SerializationError,
            Self::Interrupted,
            Self::InternalError,
        ]
        .into_iter()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code_string())
    }
}
