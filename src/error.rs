//! Error types for Pitwall
//!
//! All fallible modules use `PitwallResult<T>` as their return type. The
//! cache and recorder layers swallow these at their boundaries; only the
//! storage substrates, config loading, fetchers and CLI surface them.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Pitwall operations
pub type PitwallResult<T> = Result<T, PitwallError>;

/// All errors that can occur in Pitwall
#[derive(Error, Debug)]
pub enum PitwallError {
    // Input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No driver names provided")]
    NoDrivers,

    // Storage errors
    #[error("Storage error: {context}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupted cache entry {key}: {reason}")]
    CorruptEntry { key: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Fetch errors
    #[error("Batch fetch failed: {0}")]
    FetchTransport(String),

    #[error("Batch fetch timed out after {0}s")]
    FetchTimeout(u64),

    #[error("Invalid fixture {path}: {reason}")]
    FixtureInvalid { path: PathBuf, reason: String },

    #[error("No fixture configured for driver lookups")]
    FixtureMissing,

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl PitwallError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a storage error with context
    pub fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::FetchTransport(_) | Self::FetchTimeout(_) | Self::Storage { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NoDrivers => Some("Pass names separated by commas: pitwall drivers \"A,B\""),
            Self::FixtureMissing => Some("Pass --fixture <file> or set fetch.fixture in config"),
            Self::ConfigInvalid { .. } => Some("Run: pitwall config init --force"),
            Self::FetchTimeout(_) => Some("Raise fetch.timeout_secs or retry"),
            _ => None,
        }
    }
}
