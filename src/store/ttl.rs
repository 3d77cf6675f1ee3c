//! TTL key/value store
//!
//! Entries are persisted as `{"value": .., "stored_at": ..}` under
//! `namespace + key`. An entry is live while `now - stored_at <= ttl`;
//! the boundary itself still counts as live.

use super::clock::Clock;
use super::storage::Storage;
use crate::error::{PitwallError, PitwallResult};
use crate::model::Record;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// On-disk shape of one entry
#[derive(Debug, Serialize, Deserialize)]
struct StoredPayload {
    value: Record,
    stored_at: DateTime<Utc>,
}

/// A live cache entry. `stored_at` is fixed at write time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    /// Key without the namespace prefix
    pub key: String,

    /// Cached record
    pub value: Record,

    /// When the entry was written
    pub stored_at: DateTime<Utc>,
}

/// Result of an expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Keys under the namespace that were inspected
    pub scanned: usize,
    /// Entries deleted
    pub removed: usize,
    /// Entries that could not be read or parsed
    pub errors: usize,
    /// Entries selected for deletion whose delete failed
    pub delete_failures: usize,
}

/// Size estimate, reported but never used to evict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreUsage {
    /// Keys under the namespace
    pub entries: usize,
    /// Key plus payload length in bytes
    pub bytes: usize,
}

/// Time-bounded store over an injected substrate and clock
pub struct TtlStore {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    namespace: String,
    ttl: Duration,
}

impl TtlStore {
    /// Create a store for keys under `namespace`
    pub fn new(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        namespace: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            storage,
            clock,
            namespace: namespace.into(),
            ttl,
        }
    }

    /// Namespace prefix for every key
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Entry lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Clock used for expiry decisions
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Name of the underlying substrate
    pub fn backend_name(&self) -> &'static str {
        self.storage.backend_name()
    }

    /// Whether an entry written at `stored_at` is past its TTL
    pub fn is_expired(&self, stored_at: DateTime<Utc>) -> bool {
        self.clock.now() - stored_at > self.ttl
    }

    /// Read a live entry, returning absent on any failure
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        match self.try_get(key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cache read for {} failed: {}", key, e);
                None
            }
        }
    }

    /// Read a live entry, surfacing storage and parse failures
    ///
    /// Corrupted payloads are evicted before the error is returned.
    pub fn try_get(&self, key: &str) -> PitwallResult<Option<CacheEntry>> {
        let entry = match self.load(key) {
            Ok(entry) => entry,
            Err(e @ PitwallError::CorruptEntry { .. }) => {
                self.evict(key);
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        match entry {
            Some(entry) if self.is_expired(entry.stored_at) => {
                debug!("Cached entry {} is expired", key);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Write an entry stamped with the current time
    pub fn set(&self, key: &str, value: &Record) -> bool {
        let payload = StoredPayload {
            value: value.clone(),
            stored_at: self.clock.now(),
        };

        let result = serde_json::to_string(&payload)
            .map_err(PitwallError::from)
            .and_then(|raw| self.storage.set(&self.namespaced(key), &raw));

        match result {
            Ok(()) => {
                debug!("Cached {} at {}", key, payload.stored_at);
                true
            }
            Err(e) => {
                warn!("Cache write for {} failed: {}", key, e);
                false
            }
        }
    }

    /// Delete an entry
    pub fn remove(&self, key: &str) -> bool {
        match self.storage.remove(&self.namespaced(key)) {
            Ok(()) => true,
            Err(e) => {
                warn!("Cache delete for {} failed: {}", key, e);
                false
            }
        }
    }

    /// Remove expired and corrupted entries under the namespace
    ///
    /// Pass one identifies doomed keys, pass two deletes them. Failures in
    /// each pass are counted separately and never abort the sweep.
    pub fn remove_expired(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let keys = match self.namespace_keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Cache sweep could not enumerate keys: {}", e);
                report.errors += 1;
                return report;
            }
        };

        let mut doomed = Vec::new();
        for key in keys {
            report.scanned += 1;
            match self.load(&key) {
                Ok(Some(entry)) if self.is_expired(entry.stored_at) => doomed.push(key),
                Ok(_) => {}
                Err(e) => {
                    debug!("Sweep found unreadable entry {}: {}", key, e);
                    report.errors += 1;
                    doomed.push(key);
                }
            }
        }

        for key in doomed {
            match self.storage.remove(&self.namespaced(&key)) {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    warn!("Sweep failed to delete {}: {}", key, e);
                    report.delete_failures += 1;
                }
            }
        }

        if report.removed > 0 || report.errors > 0 {
            info!(
                "Cache sweep removed {} of {} entries ({} unreadable, {} delete failures)",
                report.removed, report.scanned, report.errors, report.delete_failures
            );
        }
        report
    }

    /// List live entries under the namespace
    pub fn entries(&self) -> Vec<CacheEntry> {
        let keys = match self.namespace_keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Cache listing failed: {}", e);
                return Vec::new();
            }
        };

        keys.iter().filter_map(|key| self.get(key)).collect()
    }

    /// Estimate entry count and byte size under the namespace
    pub fn usage(&self) -> StoreUsage {
        let mut usage = StoreUsage::default();
        let Ok(keys) = self.namespace_keys() else {
            return usage;
        };

        for key in keys {
            let full = self.namespaced(&key);
            if let Ok(Some(raw)) = self.storage.get(&full) {
                usage.entries += 1;
                usage.bytes += full.len() + raw.len();
            }
        }
        usage
    }

    /// Delete every entry under the namespace, returning how many went
    pub fn clear(&self) -> usize {
        let keys = match self.namespace_keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Cache clear could not enumerate keys: {}", e);
                return 0;
            }
        };

        keys.iter().filter(|key| self.remove(key)).count()
    }

    fn load(&self, key: &str) -> PitwallResult<Option<CacheEntry>> {
        let Some(raw) = self.storage.get(&self.namespaced(key))? else {
            return Ok(None);
        };

        let payload: StoredPayload =
            serde_json::from_str(&raw).map_err(|e| PitwallError::CorruptEntry {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Some(CacheEntry {
            key: key.to_string(),
            value: payload.value,
            stored_at: payload.stored_at,
        }))
    }

    fn evict(&self, key: &str) {
        if let Err(e) = self.storage.remove(&self.namespaced(key)) {
            warn!("Failed to evict corrupted entry {}: {}", key, e);
        }
    }

    /// Keys under the namespace, with the prefix stripped
    fn namespace_keys(&self) -> PitwallResult<Vec<String>> {
        Ok(self
            .storage
            .keys()?
            .into_iter()
            .filter_map(|k| k.strip_prefix(&self.namespace).map(String::from))
            .collect())
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ManualClock, MemoryStorage};
    use serde_json::json;

    const NS: &str = "test:";

    fn test_store(ttl_secs: i64) -> (TtlStore, Arc<MemoryStorage>, Arc<ManualClock>) {
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(ManualClock::default());
        let store = TtlStore::new(
            storage.clone(),
            clock.clone(),
            NS,
            Duration::seconds(ttl_secs),
        );
        (store, storage, clock)
    }

    /// Substrate whose deletes always fail
    struct StuckStorage(MemoryStorage);

    impl Storage for StuckStorage {
        fn get(&self, key: &str) -> PitwallResult<Option<String>> {
            self.0.get(key)
        }
        fn set(&self, key: &str, value: &str) -> PitwallResult<()> {
            self.0.set(key, value)
        }
        fn remove(&self, _key: &str) -> PitwallResult<()> {
            Err(PitwallError::storage(
                "remove",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            ))
        }
        fn keys(&self) -> PitwallResult<Vec<String>> {
            self.0.keys()
        }
        fn backend_name(&self) -> &'static str {
            "stuck"
        }
    }

    #[test]
    fn set_and_get() {
        let (store, _, _) = test_store(60);
        assert!(store.set("driver1", &json!({"display_name": "A"})));

        let entry = store.get("driver1").unwrap();
        assert_eq!(entry.key, "driver1");
        assert_eq!(entry.value, json!({"display_name": "A"}));
    }

    #[test]
    fn entries_are_namespaced() {
        let (store, storage, _) = test_store(60);
        store.set("driver1", &json!({}));
        assert_eq!(storage.keys().unwrap(), vec!["test:driver1"]);
    }

    #[test]
    fn ttl_boundary_is_inclusive() {
        let (store, _, clock) = test_store(60);
        store.set("driver1", &json!({"v": 1}));

        clock.advance(Duration::seconds(60));
        assert!(store.get("driver1").is_some(), "exactly TTL old is still live");

        clock.advance(Duration::milliseconds(1));
        assert!(store.get("driver1").is_none());
    }

    #[test]
    fn zero_ttl_expires_once_time_moves() {
        let (store, _, clock) = test_store(0);
        store.set("driver1", &json!({}));
        assert!(store.get("driver1").is_some());

        clock.advance(Duration::milliseconds(1));
        assert!(store.get("driver1").is_none());
    }

    #[test]
    fn corrupted_payload_reads_as_absent_and_is_evicted() {
        let (store, storage, _) = test_store(60);
        storage.set("test:bad", "{not json").unwrap();

        assert!(store.get("bad").is_none());
        assert!(storage.get("test:bad").unwrap().is_none());
    }

    #[test]
    fn try_get_surfaces_corruption() {
        let (store, storage, _) = test_store(60);
        storage.set("test:bad", "[]").unwrap();

        let err = store.try_get("bad").unwrap_err();
        assert!(matches!(err, PitwallError::CorruptEntry { .. }));
    }

    #[test]
    fn remove_expired_sweeps_expired_and_corrupted() {
        let (store, storage, clock) = test_store(60);
        store.set("old", &json!({}));
        clock.advance(Duration::seconds(61));
        store.set("fresh", &json!({}));
        storage.set("test:corrupt", "garbage").unwrap();
        storage.set("other:ignored", "garbage").unwrap();

        let report = store.remove_expired();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.removed, 2);
        assert_eq!(report.errors, 1);
        assert_eq!(report.delete_failures, 0);

        assert!(store.get("fresh").is_some());
        assert!(storage.get("test:corrupt").unwrap().is_none());
        assert!(storage.get("other:ignored").unwrap().is_some());
    }

    #[test]
    fn remove_expired_counts_delete_failures_separately() {
        let storage = Arc::new(StuckStorage(MemoryStorage::new()));
        let clock = Arc::new(ManualClock::default());
        let store = TtlStore::new(storage.clone(), clock.clone(), NS, Duration::seconds(1));
        store.set("a", &json!({}));
        clock.advance(Duration::seconds(5));

        let report = store.remove_expired();
        assert_eq!(report.removed, 0);
        assert_eq!(report.errors, 0);
        assert_eq!(report.delete_failures, 1);
    }

    #[test]
    fn usage_counts_key_and_payload_bytes() {
        let (store, storage, _) = test_store(60);
        store.set("a", &json!({"x": 1}));

        let raw = storage.get("test:a").unwrap().unwrap();
        let usage = store.usage();
        assert_eq!(usage.entries, 1);
        assert_eq!(usage.bytes, "test:a".len() + raw.len());
    }

    #[test]
    fn entries_and_clear() {
        let (store, _, clock) = test_store(60);
        store.set("a", &json!({}));
        clock.advance(Duration::seconds(120));
        store.set("b", &json!({}));

        let live: Vec<_> = store.entries().into_iter().map(|e| e.key).collect();
        assert_eq!(live, vec!["b"]);

        assert_eq!(store.clear(), 2);
        assert_eq!(store.usage().entries, 0);
    }
}
