//! Fetcher backed by a JSON fixture file
//!
//! The fixture is an object keyed by driver name:
//!
//! ```json
//! {
//!   "Max Verstappen": { "display_name": "Max Verstappen", "cust_id": 1 },
//!   "Ghost": { "error": "Profile request failed", "status": 502 }
//! }
//! ```
//!
//! Objects with an `"error"` string are per-driver failures. Names that
//! are absent from the fixture come back as not found.

use super::DriverFetcher;
use crate::error::{PitwallError, PitwallResult};
use crate::model::{EntityResult, FetchError, Record};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Serves driver profiles from a fixture file
#[derive(Debug, Clone)]
pub struct FixtureFetcher {
    path: PathBuf,
    entries: HashMap<String, Record>,
}

impl FixtureFetcher {
    /// Load a fixture from disk
    pub async fn load(path: &Path) -> PitwallResult<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PitwallError::io(format!("reading fixture {}", path.display()), e))?;

        Self::from_json(path, &content)
    }

    /// Parse fixture content
    pub fn from_json(path: &Path, content: &str) -> PitwallResult<Self> {
        let value: Record =
            serde_json::from_str(content).map_err(|e| PitwallError::FixtureInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let Record::Object(map) = value else {
            return Err(PitwallError::FixtureInvalid {
                path: path.to_path_buf(),
                reason: "top level must be an object keyed by driver name".to_string(),
            });
        };

        debug!("Loaded {} fixture drivers from {}", map.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            entries: map.into_iter().collect(),
        })
    }

    /// Number of drivers in the fixture
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the fixture has no drivers
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn resolve(&self, id: &str) -> EntityResult {
        let Some(entry) = self.entries.get(id) else {
            return EntityResult::Failed(FetchError::not_found(id));
        };

        match entry.get("error").and_then(Record::as_str) {
            Some(message) => {
                let mut error = FetchError::new(message);
                if let Some(status) = entry
                    .get("status")
                    .and_then(Record::as_u64)
                    .and_then(|s| u16::try_from(s).ok())
                {
                    error = error.with_status(status);
                }
                if let Some(kind) = entry
                    .get("kind")
                    .and_then(|k| serde_json::from_value(k.clone()).ok())
                {
                    error = error.with_kind(kind);
                }
                EntityResult::Failed(error)
            }
            None => EntityResult::Found(entry.clone()),
        }
    }
}

#[async_trait]
impl DriverFetcher for FixtureFetcher {
    async fn fetch_batch(&self, ids: &[String]) -> PitwallResult<HashMap<String, EntityResult>> {
        Ok(ids
            .iter()
            .map(|id| (id.clone(), self.resolve(id)))
            .collect())
    }

    fn source_name(&self) -> &str {
        self.path.to_str().unwrap_or("fixture")
    }
}
