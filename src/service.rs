//! Cache-first batch lookups
//!
//! [`DriverService`] wires the TTL store, entity cache, coordinator and
//! error recorder together explicitly and runs one batch at a time per
//! call. Any number of calls may run concurrently against one service.

use crate::cache::{ConcurrentCache, EntityCache, FetchLease};
use crate::config::schema::{CacheBackend, CacheConfig};
use crate::config::ConfigManager;
use crate::error::{PitwallError, PitwallResult};
use crate::faults::{BatchReport, ErrorKind, ErrorRecorder};
use crate::fetch::{DriverFetcher, RenderSink};
use crate::model::{valid_entity_id, EntityResult, FetchError};
use crate::store::{Clock, DirStorage, MemoryStorage, Storage, SweepReport, SystemClock, TtlStore};
use chrono::Duration;
use futures_util::future::{join_all, BoxFuture, Shared};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-batch counters, fresh for every call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OperationStats {
    pub hits: usize,
    pub misses: usize,
    pub successes: usize,
    pub failures: usize,
    /// Invalid ids, unreadable cache entries and recorder faults
    pub errors: usize,
}

/// Everything a caller gets back from one batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    /// Settled drivers, from cache or fresh
    pub results: BTreeMap<String, EntityResult>,
    pub stats: OperationStats,
    pub report: BatchReport,
    pub cache_hit_rate: String,
}

/// Result of a maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub expired: SweepReport,
    pub pending_cleared: usize,
}

/// Orchestrates cache-first driver lookups
pub struct DriverService {
    coordinator: ConcurrentCache,
    recorder: ErrorRecorder,
    fetch_timeout: Option<std::time::Duration>,
}

impl DriverService {
    /// Compose a service over a TTL store
    pub fn new(store: TtlStore) -> Self {
        let clock = store.clock().clone();
        Self {
            coordinator: ConcurrentCache::new(EntityCache::new(store)),
            recorder: ErrorRecorder::new(clock),
            fetch_timeout: None,
        }
    }

    /// Build the storage stack described by the cache config
    ///
    /// A relative `cache.dir` is resolved against the config file that
    /// `manager` loaded.
    pub fn from_config(config: &CacheConfig, manager: &ConfigManager) -> PitwallResult<Self> {
        let storage: Arc<dyn Storage> = match config.backend {
            CacheBackend::Memory => Arc::new(MemoryStorage::new()),
            CacheBackend::Dir => Arc::new(DirStorage::open(manager.cache_dir(config))?),
        };

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = TtlStore::new(storage, clock, config.namespace.clone(), config.ttl());
        Ok(Self::new(store))
    }

    /// Bound how long one batch fetch may take
    pub fn with_fetch_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Coordinator in front of the cache
    pub fn coordinator(&self) -> &ConcurrentCache {
        &self.coordinator
    }

    /// Entity cache facade
    pub fn cache(&self) -> &EntityCache {
        self.coordinator.cache()
    }

    /// Error log and success counters
    pub fn recorder(&self) -> &ErrorRecorder {
        &self.recorder
    }

    /// Look up a batch of drivers, cache first
    ///
    /// Never fails as a whole. Per-driver failures, including a transport
    /// failure of the fetch itself, come back as `EntityResult::Failed`.
    /// Each driver is handed to `sink` as soon as it settles.
    pub async fn fetch_drivers(
        &self,
        ids: &[String],
        fetcher: &dyn DriverFetcher,
        sink: &dyn RenderSink,
    ) -> BatchOutcome {
        let mut stats = OperationStats::default();

        let mut seen = HashSet::new();
        let mut requested = Vec::with_capacity(ids.len());
        for id in ids {
            if valid_entity_id(id).is_none() {
                warn!("Skipping invalid driver id {:?}", id);
                stats.errors += 1;
                continue;
            }
            if seen.insert(id.as_str()) {
                requested.push(id.clone());
            }
        }

        info!("Looking up {} drivers", requested.len());

        let split = self.coordinator.split_cached_and_uncached(&requested);
        stats.hits = split.stats.cached;
        stats.misses = split.stats.uncached;
        stats.errors += split.stats.errors;

        let mut results = BTreeMap::new();
        for (id, record) in split.cached {
            let result = EntityResult::Found(record);
            sink.render(&id, &result);
            results.insert(id, result);
        }

        let claims = self.coordinator.claim_fetches(&split.uncached);
        let (fetched, joined) = tokio::join!(
            self.settle_owned(claims.owned, fetcher, sink),
            Self::settle_joined(claims.joined, sink),
        );
        results.extend(fetched);
        results.extend(joined);

        let report = self.recorder.process_batch_results(&results, &requested);
        stats.successes = report.successes;
        stats.failures = report.failures;
        stats.errors += report.errors;

        BatchOutcome {
            results,
            stats,
            report,
            cache_hit_rate: split.stats.cache_hit_rate,
        }
    }

    /// Sweep expired entries and stale pending markers
    ///
    /// Compensating action for fetches that never settled. Nothing calls
    /// this implicitly; callers decide when to run it.
    pub fn run_maintenance(&self, stale_after: Duration) -> MaintenanceReport {
        MaintenanceReport {
            expired: self.cache().remove_expired(),
            pending_cleared: self
                .coordinator
                .cleanup_pending_operations(Some(stale_after)),
        }
    }

    /// Fetch the drivers this batch owns and write them back
    async fn settle_owned(
        &self,
        owned: Vec<FetchLease<'_>>,
        fetcher: &dyn DriverFetcher,
        sink: &dyn RenderSink,
    ) -> Vec<(String, EntityResult)> {
        if owned.is_empty() {
            return Vec::new();
        }

        let owned_ids: Vec<String> = owned.iter().map(|l| l.key().to_string()).collect();
        debug!(
            "Fetching {} drivers from {}",
            owned_ids.len(),
            fetcher.source_name()
        );

        let mut fetched = match self.fetch_batch(fetcher, &owned_ids).await {
            Ok(map) => map,
            Err(e) => {
                warn!(
                    "Batch fetch failed, marking {} drivers failed: {}",
                    owned_ids.len(),
                    e
                );
                transport_failures(&owned_ids, &e)
            }
        };

        let mut settled = Vec::with_capacity(owned.len());
        for lease in owned {
            let id = lease.key().to_string();
            let Some(result) = fetched.remove(&id) else {
                // Dropping the lease releases joiners with an abandoned error
                warn!("Fetch returned no result for {}", id);
                continue;
            };

            let result = reject_malformed(&id, result);
            if let EntityResult::Found(record) = &result {
                if !self.coordinator.set_concurrent(&id, record).await {
                    warn!("Fetched profile for {} could not be cached", id);
                }
            }

            sink.render(&id, &result);
            lease.complete(result.clone());
            settled.push((id, result));
        }

        for id in fetched.keys() {
            debug!("Ignoring unrequested driver {} from fetch", id);
        }
        settled
    }

    /// Wait on drivers another batch is already fetching
    async fn settle_joined(
        joined: Vec<(String, Shared<BoxFuture<'static, EntityResult>>)>,
        sink: &dyn RenderSink,
    ) -> Vec<(String, EntityResult)> {
        join_all(joined.into_iter().map(|(id, fetch)| async move {
            let result = fetch.await;
            sink.render(&id, &result);
            (id, result)
        }))
        .await
    }

    async fn fetch_batch(
        &self,
        fetcher: &dyn DriverFetcher,
        ids: &[String],
    ) -> PitwallResult<HashMap<String, EntityResult>> {
        match self.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, fetcher.fetch_batch(ids))
                .await
                .unwrap_or_else(|_| Err(PitwallError::FetchTimeout(limit.as_secs()))),
            None => fetcher.fetch_batch(ids).await,
        }
    }
}

/// Profiles must be JSON objects; anything else is a parse failure
fn reject_malformed(id: &str, result: EntityResult) -> EntityResult {
    match result {
        EntityResult::Found(record) if !record.is_object() => {
            warn!("Fetched profile for {} is not an object", id);
            EntityResult::Failed(
                FetchError::new(format!("Malformed profile for {}", id))
                    .with_kind(ErrorKind::Parse),
            )
        }
        other => other,
    }
}

/// Mark every driver of a failed batch as failed
fn transport_failures(ids: &[String], error: &PitwallError) -> HashMap<String, EntityResult> {
    let kind = match error {
        PitwallError::FetchTimeout(_) => ErrorKind::Timeout,
        _ => ErrorKind::Network,
    };
    let failure = FetchError::new(error.to_string()).with_kind(kind);

    ids.iter()
        .map(|id| (id.clone(), EntityResult::Failed(failure.clone())))
        .collect()
}
