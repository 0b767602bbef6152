//! Error types for compilation database resolution
//!
//! Expected absence (no stage, no database yet, no sysroot key) is modelled
//! with `Option`, never with an error. Everything in here is fatal for the
//! request that produced it.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for resolution operations
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The build cache could not be opened, usually because the stage was never configured
    #[error("Failed to open build cache '{path}': {source}")]
    CacheOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read build cache '{path}': {source}")]
    CacheRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The router produced a stage that the database table does not know about
    #[error(
        "Stage '{stage}' has no compilation database entry. The routing and database tables are out of sync"
    )]
    MissingDatabaseEntry { stage: String },

    #[error("Prefix '{prefix}' is claimed by both stage '{first}' and stage '{second}'")]
    DuplicatePrefix {
        prefix: String,
        first: String,
        second: String,
    },

    #[error("Stage '{stage}' declares an empty path prefix")]
    EmptyPrefix { stage: String },

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },
}

impl ResolveError {
    pub fn cache_open(path: PathBuf, source: std::io::Error) -> Self {
        Self::CacheOpen { path, source }
    }

    pub fn cache_read(path: PathBuf, source: std::io::Error) -> Self {
        Self::CacheRead { path, source }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::CacheOpen { .. } => "CACHE_OPEN_ERROR",
            Self::CacheRead { .. } => "CACHE_READ_ERROR",
            Self::MissingDatabaseEntry { .. } => "MISSING_DATABASE_ENTRY",
            Self::DuplicatePrefix { .. } => "DUPLICATE_PREFIX",
            Self::EmptyPrefix { .. } => "EMPTY_PREFIX",
            Self::Config { .. } => "CONFIG_ERROR",
        }
        .to_string()
    }

    /// True when the error comes from the static tables rather than the filesystem
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingDatabaseEntry { .. }
                | Self::DuplicatePrefix { .. }
                | Self::EmptyPrefix { .. }
                | Self::Config { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::CacheOpen { .. } => vec![
                "Configure the build tree first (run cmake in the build directory)",
                "Check 'build_dir' and 'sysroot.cache_file' in .stagedb/settings.toml",
            ],
            Self::CacheRead { .. } => vec![
                "Re-run the build configuration to regenerate the cache",
                "Check the file for non UTF-8 content",
            ],
            Self::MissingDatabaseEntry { .. } => vec![
                "Add the stage to the [databases] table",
                "Run 'stagedb check' to list every stage without a database entry",
            ],
            Self::DuplicatePrefix { .. } => {
                vec!["Keep each prefix under exactly one stage in the [routing] table"]
            }
            Self::EmptyPrefix { .. } => vec!["Remove the empty prefix from the [routing] table"],
            Self::Config { .. } => vec![
                "Run 'stagedb config' to inspect the effective settings",
                "Run 'stagedb init --force' to regenerate the settings file",
            ],
        }
    }
}

/// Result type alias for resolution operations
pub type ResolveResult<T> = Result<T, ResolveError>;
