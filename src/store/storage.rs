//! Storage substrate abstraction
//!
//! A substrate is any session-scoped string key/value surface. It knows
//! nothing about namespaces, timestamps or expiry.

use crate::error::PitwallResult;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Minimal key/value surface the TTL store is built on
pub trait Storage: Send + Sync {
    /// Read a raw value
    fn get(&self, key: &str) -> PitwallResult<Option<String>>;

    /// Write a raw value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> PitwallResult<()>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> PitwallResult<()>;

    /// Enumerate every key currently stored
    fn keys(&self) -> PitwallResult<Vec<String>>;

    /// Human-readable backend name for display
    fn backend_name(&self) -> &'static str;
}

/// In-process substrate that lives as long as the process
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty substrate
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> PitwallResult<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PitwallResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> PitwallResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> PitwallResult<Vec<String>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.keys().cloned().collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
