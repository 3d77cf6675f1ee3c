//! Per-driver cache facade over the TTL store

use crate::model::{valid_entity_id, validate_entry, Record};
use crate::store::{StoreUsage, SweepReport, TtlStore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Per-call lookup counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LookupStats {
    pub hits: usize,
    pub misses: usize,
    /// Invalid ids and storage failures
    pub errors: usize,
}

/// Result of [`EntityCache::get_many`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManyResult {
    pub data: BTreeMap<String, Record>,
    pub stats: LookupStats,
}

/// Lifetime counters and size estimate for the facade
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub backend: String,
    pub namespace: String,
    pub ttl_secs: i64,
    pub hits: u64,
    pub misses: u64,
    pub usage: StoreUsage,
}

/// Typed get/set over the TTL store, keyed by driver id
pub struct EntityCache {
    store: TtlStore,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EntityCache {
    /// Wrap a TTL store
    pub fn new(store: TtlStore) -> Self {
        Self {
            store,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Underlying store
    pub fn store(&self) -> &TtlStore {
        &self.store
    }

    /// Cached profile for a driver, if live
    pub fn get_entity(&self, id: &str) -> Option<Record> {
        let Some(id) = valid_entity_id(id) else {
            warn!("Rejected cache read for invalid driver id {:?}", id);
            return None;
        };

        match self.store.get(id) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for {}", id);
                Some(entry.value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Cache miss for {}", id);
                None
            }
        }
    }

    /// Cache a driver profile; only JSON objects are accepted
    pub fn set_entity(&self, id: &str, record: &Record) -> bool {
        match validate_entry(id, record) {
            Ok(id) => self.store.set(id, record),
            Err(e) => {
                warn!("Rejected cache write: {}", e);
                false
            }
        }
    }

    /// Whether a live profile is cached, without touching hit counters
    pub fn is_entity_cached(&self, id: &str) -> bool {
        valid_entity_id(id).is_some_and(|id| self.store.get(id).is_some())
    }

    /// Look up many drivers, each independently
    ///
    /// A failed read counts as both a miss and an error and never stops the
    /// remaining lookups. Invalid ids count as errors only.
    pub fn get_many<S: AsRef<str>>(&self, ids: &[S]) -> ManyResult {
        let mut result = ManyResult::default();

        for id in ids {
            let id = id.as_ref();
            let Some(id) = valid_entity_id(id) else {
                warn!("Skipping invalid driver id {:?}", id);
                result.stats.errors += 1;
                continue;
            };

            match self.store.try_get(id) {
                Ok(Some(entry)) => {
                    result.stats.hits += 1;
                    result.data.insert(id.to_string(), entry.value);
                }
                Ok(None) => result.stats.misses += 1,
                Err(e) => {
                    warn!("Cache read for {} failed: {}", id, e);
                    result.stats.misses += 1;
                    result.stats.errors += 1;
                }
            }
        }

        self.hits
            .fetch_add(result.stats.hits as u64, Ordering::Relaxed);
        self.misses
            .fetch_add(result.stats.misses as u64, Ordering::Relaxed);
        result
    }

    /// Cache many profiles, each independently
    ///
    /// Succeeds if at least one write succeeded.
    pub fn set_many<'a, I>(&self, records: I) -> bool
    where
        I: IntoIterator<Item = (&'a String, &'a Record)>,
    {
        let mut written = 0usize;
        let mut failed = 0usize;

        for (id, record) in records {
            if self.set_entity(id, record) {
                written += 1;
            } else {
                failed += 1;
            }
        }

        if failed > 0 {
            warn!("Cached {} profiles, {} writes failed", written, failed);
        }
        written > 0
    }

    /// Drop one driver from the cache
    pub fn invalidate(&self, id: &str) -> bool {
        match valid_entity_id(id) {
            Some(id) => self.store.remove(id),
            None => false,
        }
    }

    /// Sweep expired and corrupted entries
    pub fn remove_expired(&self) -> SweepReport {
        self.store.remove_expired()
    }

    /// Lifetime counters plus a size estimate
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            backend: self.store.backend_name().to_string(),
            namespace: self.store.namespace().to_string(),
            ttl_secs: self.store.ttl().num_seconds(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            usage: self.store.usage(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ManualClock, MemoryStorage, Storage};
    use chrono::Duration;
    use serde_json::json;
    use std::sync::Arc;

    fn test_cache() -> (EntityCache, Arc<MemoryStorage>, Arc<ManualClock>) {
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(ManualClock::default());
        let store = TtlStore::new(storage.clone(), clock.clone(), "drv:", Duration::hours(1));
        (EntityCache::new(store), storage, clock)
    }

    #[test]
    fn round_trip_is_deep_equal() {
        let (cache, _, _) = test_cache();
        let record = json!({
            "display_name": "A",
            "cust_id": 12345,
            "licenses": [{"category": "road", "irating": 2100}],
        });

        assert!(cache.set_entity("driver1", &record));
        assert_eq!(cache.get_entity("driver1"), Some(record));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let (cache, storage, _) = test_cache();
        assert!(!cache.set_entity("", &json!({})));
        assert!(!cache.set_entity("driver1", &json!("not an object")));
        assert!(!cache.set_entity("driver1", &json!([1, 2])));
        assert!(cache.get_entity("  ").is_none());
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn get_many_counts_per_item() {
        let (cache, storage, _) = test_cache();
        cache.set_entity("a", &json!({"n": 1}));
        storage.set("drv:broken", "{").unwrap();

        let result = cache.get_many(&["a", "b", "", "broken"]);
        assert_eq!(result.data.len(), 1);
        assert_eq!(result.data["a"], json!({"n": 1}));
        assert_eq!(
            result.stats,
            LookupStats {
                hits: 1,
                misses: 2,
                errors: 2
            }
        );
    }

    #[test]
    fn set_many_partial_success_is_success() {
        let (cache, _, _) = test_cache();
        let mut records = BTreeMap::new();
        records.insert("good".to_string(), json!({"ok": true}));
        records.insert("bad".to_string(), json!(42));

        assert!(cache.set_many(&records));
        assert!(cache.is_entity_cached("good"));
        assert!(!cache.is_entity_cached("bad"));
    }

    #[test]
    fn set_many_all_failed_is_failure() {
        let (cache, _, _) = test_cache();
        let mut records = BTreeMap::new();
        records.insert(String::new(), json!({}));
        records.insert("x".to_string(), json!(null));

        assert!(!cache.set_many(&records));
        assert!(!cache.set_many(&BTreeMap::<String, Record>::new()));
    }

    #[test]
    fn expired_entity_is_not_cached() {
        let (cache, _, clock) = test_cache();
        cache.set_entity("a", &json!({}));
        clock.advance(Duration::hours(1) + Duration::seconds(1));
        assert!(!cache.is_entity_cached("a"));
        assert!(cache.get_entity("a").is_none());
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let (cache, _, _) = test_cache();
        cache.set_entity("a", &json!({}));
        cache.get_entity("a");
        cache.get_entity("b");
        cache.get_many(&["a", "c"]);

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.usage.entries, 1);
        assert_eq!(stats.backend, "memory");
        assert_eq!(stats.ttl_secs, 3600);
    }

    #[test]
    fn invalidate_removes_entry() {
        let (cache, _, _) = test_cache();
        cache.set_entity("a", &json!({}));
        assert!(cache.invalidate("a"));
        assert!(!cache.is_entity_cached("a"));
        assert!(!cache.invalidate(""));
    }
}
