//! Custom error types for `snowgeo` operations.
//!
//! Every failure that aborts a fetch surfaces as a single [`SnowGeoError`]
//! with a human-readable message. Non-fatal conditions (unknown column types,
//! unexpected date shapes) are logged instead and never reach this type.

use std::path::PathBuf;

use snowgeo_core_common::SourceError;
use thiserror::Error;

/// Main error type for `snowgeo` operations.
///
/// This is the root error type that encompasses all domain-specific errors.
/// It uses `#[error(transparent)]` to delegate display formatting to the
/// underlying error variants.
#[derive(Debug, Error)]
pub enum SnowGeoError {
    /// The requested table is not one of the supported ticket tables.
    #[error("Only the incident and request tables are supported (requested '{requested}')")]
    UnsupportedTable {
        /// The requested table id
        requested: String,
        /// Comma-separated list of supported ids
        available: String,
    },

    /// Schema resolution failed
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// A table page query failed
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The dictionary metadata query for a table failed.
///
/// No partial schema is usable, so the whole request is aborted.
#[derive(Debug, Error)]
#[error("Failed to resolve schema for table '{table}': {source}")]
pub struct ResolutionError {
    /// The source table being described
    pub table: String,
    /// The underlying upstream failure
    #[source]
    pub source: SourceError,
}

/// A table page query failed while paging.
///
/// Rows already fetched for the request are discarded.
#[derive(Debug, Error)]
#[error("Failed to query table '{table}' at offset {offset}: {source}")]
pub struct QueryError {
    /// The source table being paged
    pub table: String,
    /// Offset of the failed page
    pub offset: usize,
    /// The underlying upstream failure
    #[source]
    pub source: SourceError,
}

/// Configuration errors.
///
/// These errors occur when the configuration file cannot be read or holds
/// invalid values.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid option value
    #[error("Invalid {option} option: {message}")]
    InvalidOption {
        /// The option name
        option: String,
        /// Why it's invalid
        message: String,
    },

    /// Required option is missing
    #[error("Missing required option: {option}")]
    MissingRequired {
        /// The missing option name
        option: String,
    },

    /// The configuration file could not be read
    #[error("Failed to read configuration file '{path}': {source}")]
    Read {
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected shape
    #[error("Failed to parse configuration file '{path}': {source}")]
    Parse {
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: serde_json::Error,
    },
}

/// Type alias for Results using `SnowGeoError`.
pub type Result<T> = std::result::Result<T, SnowGeoError>;

impl SnowGeoError {
    /// Get a user-friendly error message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedTable {
                requested,
                available,
            } => {
                format!(
                    "Table '{requested}' is not supported.\n\nSupported tables:\n{}",
                    available
                        .split(", ")
                        .map(|t| format!("  - {t}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                )
            },
            Self::Resolution(e) => format!("Schema error: {e}"),
            Self::Query(e) => format!("Query error: {e}"),
            Self::Config(e) => format!("Configuration error: {e}"),
        }
    }

    /// Get recovery suggestions if available.
    #[must_use]
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::UnsupportedTable { .. } => {
                Some("Run 'snowgeo tables' to see the supported tables.".to_string())
            },
            Self::Resolution(e) => e.source.recovery_suggestion(),
            Self::Query(e) => e.source.recovery_suggestion(),
            Self::Config(ConfigError::MissingRequired { .. }) => {
                Some("Add the missing option to the configuration file.".to_string())
            },
            _ => None,
        }
    }

    /// Check if this error is potentially recoverable.
    ///
    /// Recoverable errors might be fixed by retrying with different
    /// parameters or after the user takes some action.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Config(_) | Self::UnsupportedTable { .. })
    }
}

trait SourceErrorExt {
    fn recovery_suggestion(&self) -> Option<String>;
}

impl SourceErrorExt for SourceError {
    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            SourceError::Transport { .. } => {
                Some("Check the instance URL and network connectivity.".to_string())
            },
            SourceError::Status { status: 401 | 403, .. } => {
                Some("Check the configured username and password.".to_string())
            },
            _ => None,
        }
    }
}
