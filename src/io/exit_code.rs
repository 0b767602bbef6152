//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success - settings were resolved
//! - `1`: General error - unspecified failure
//! - `2`: Blocking error - the static tables are inconsistent
//! - `3-125`: Specific recoverable errors
//! - `126-255`: Reserved by shell

use crate::error::ResolveError;

/// Standard exit codes for CLI operations.
///
/// These codes follow Unix conventions where 0 indicates success,
/// and non-zero values indicate various error conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Critical error that should halt automation (code 2)
    BlockingError = 2,

    /// Nothing applies to the file but the command ran fine (code 3)
    NotFound = 3,

    /// Build cache I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl ExitCode {
    /// Determine exit code for a lookup based on result presence.
    ///
    /// Returns `Success` if data is found, `NotFound` if empty.
    pub fn from_lookup<T>(result: &Option<T>) -> Self {
        match result {
            Some(_) => ExitCode::Success,
            None => ExitCode::NotFound,
        }
    }

    /// Convert a `ResolveError` to the appropriate exit code.
    pub fn from_error(error: &ResolveError) -> Self {
        match error {
            // The routing and database tables disagree, nothing can be trusted
            ResolveError::MissingDatabaseEntry { .. } | ResolveError::DuplicatePrefix { .. } => {
                ExitCode::BlockingError
            }
            ResolveError::EmptyPrefix { .. } | ResolveError::Config { .. } => {
                ExitCode::ConfigError
            }
            ResolveError::CacheOpen { .. } | ResolveError::CacheRead { .. } => ExitCode::IoError,
        }
    }

    /// Check if this exit code indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Get a human-readable description of the exit code.
    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::BlockingError => "Blocking error - automation should halt",
            ExitCode::NotFound => "Not found",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
        }
    }
}
