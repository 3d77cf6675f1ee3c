//! Error classification

use crate::model::FetchError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a per-entity failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Upstream unreachable or answered with a server error
    Network,
    /// Request did not complete in time
    Timeout,
    /// Upstream has no such driver
    NotFound,
    /// Upstream answered with something unparseable
    Parse,
    /// Upstream rejected our credentials
    Auth,
    /// Anything else
    Unknown,
}

impl ErrorKind {
    /// Classify an error from its metadata
    ///
    /// An explicit kind wins, then the status code. Without either the
    /// error is `Unknown`; the message text is never inspected.
    pub fn classify(error: &FetchError) -> Self {
        if let Some(kind) = error.kind {
            return kind;
        }
        match error.status {
            Some(status) => Self::from_status(status),
            None => Self::Unknown,
        }
    }

    /// Map an HTTP-like status code
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            404 => Self::NotFound,
            408 | 504 => Self::Timeout,
            400..=599 => Self::Network,
            _ => Self::Unknown,
        }
    }

    /// Normalized message shown for a failed driver
    pub fn user_message(&self, id: &str) -> String {
        match self {
            Self::Network => format!("Could not reach the profile service for {}", id),
            Self::Timeout => format!("Timed out loading {}", id),
            Self::NotFound => format!("Driver not found: {}", id),
            Self::Parse => format!("Received an unreadable profile for {}", id),
            Self::Auth => format!("Not authorized to load {}", id),
            Self::Unknown => format!("Unexpected error for {}", id),
        }
    }

    /// All kinds in display order
    pub fn all() -> &'static [Self] {
        &[
            Self::Network,
            Self::Timeout,
            Self::NotFound,
            Self::Parse,
            Self::Auth,
            Self::Unknown,
        ]
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::NotFound => "not_found",
            Self::Parse => "parse",
            Self::Auth => "auth",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}
