//! Shared data types for driver lookups

use crate::error::{PitwallError, PitwallResult};
use crate::faults::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A driver profile as returned by the remote API
///
/// Only JSON objects are accepted as records; everything else is rejected
/// at the cache boundary.
pub type Record = serde_json::Value;

/// Error attached to a single entity by the fetch layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchError {
    /// Human-readable message from the source
    pub message: String,

    /// HTTP-like status code, when the source reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Explicit classification, when the source already knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl FetchError {
    /// Create an unclassified error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            kind: None,
        }
    }

    /// Attach a status code
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach an explicit kind
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Error for a driver the source has no record of
    pub fn not_found(id: &str) -> Self {
        Self::new(format!("Driver not found: {}", id)).with_kind(ErrorKind::NotFound)
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {})", self.message, status),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Outcome of looking up one entity
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityResult {
    /// The profile, from cache or a fresh fetch
    Found(Record),
    /// The lookup failed for this entity only
    Failed(FetchError),
}

impl EntityResult {
    /// Whether this result carries an error marker
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The record, if the lookup succeeded
    pub fn record(&self) -> Option<&Record> {
        match self {
            Self::Found(record) => Some(record),
            Self::Failed(_) => None,
        }
    }
}

/// Check an entity identifier, returning it when usable as a cache key
pub fn valid_entity_id(id: &str) -> Option<&str> {
    if id.trim().is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Check an id and profile before they are written to the cache
pub fn validate_entry<'a>(id: &'a str, record: &Record) -> PitwallResult<&'a str> {
    let id = valid_entity_id(id)
        .ok_or_else(|| PitwallError::InvalidInput(format!("driver id {:?} is blank", id)))?;

    if !record.is_object() {
        return Err(PitwallError::InvalidInput(format!(
            "profile for {} is not an object",
            id
        )));
    }
    Ok(id)
}

/// Parse a comma-separated list of driver names
///
/// Names are trimmed and empty segments are dropped, so `"a, b,,c"`
/// yields `["a", "b", "c"]`.
pub fn parse_driver_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}
