//! Concurrent access coordination
//!
//! Tracks in-flight operations per driver so that:
//!
//! - concurrent writes to the same driver resolve last-writer-wins, where
//!   "last" is the order in which `set_concurrent` was called
//! - a driver already being fetched by one batch is awaited, not
//!   refetched, by any other batch
//! - readers only ever observe a whole record, before or after a write
//!
//! Every tracked operation is released by a drop guard, so pending
//! entries clear on success, failure and cancellation alike. Operations
//! that hang forever can be swept with
//! [`ConcurrentCache::cleanup_pending_operations`].

use super::entity::{CacheStats, EntityCache};
use crate::faults::recorder::{format_rate, percentage};
use crate::faults::ErrorKind;
use crate::model::{valid_entity_id, EntityResult, FetchError, Record};
use chrono::{DateTime, Duration, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Kind of tracked operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Fetch-and-cache of a driver not in cache
    Get,
    /// Write-back of a record
    Set,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "get"),
            Self::Set => write!(f, "set"),
        }
    }
}

/// Marker for an outstanding operation on one driver
#[derive(Debug, Clone, Serialize)]
pub struct PendingOperation {
    pub key: String,
    pub kind: OperationKind,
    /// When the oldest outstanding call for this key started
    pub started_at: DateTime<Utc>,
    /// Calls currently outstanding for this key and kind
    pub outstanding: usize,
    #[serde(skip)]
    generation: u64,
}

/// Counters for [`SplitResult`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitStats {
    pub total: usize,
    pub cached: usize,
    pub uncached: usize,
    /// Invalid ids and unreadable entries
    pub errors: usize,
    /// `cached / total` as a percentage with one decimal, `0%` when empty
    pub cache_hit_rate: String,
}

/// Drivers partitioned by cache state
#[derive(Debug, Clone, PartialEq)]
pub struct SplitResult {
    pub cached: BTreeMap<String, Record>,
    pub uncached: Vec<String>,
    pub stats: SplitStats,
}

/// Coordinator-level operation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OperationCounters {
    /// Coordinated reads, one per valid id looked up
    pub gets: u64,
    pub sets: u64,
    /// Sets issued while another set for the same driver was pending
    pub deduped_sets: u64,
    /// Drivers awaited from another batch's fetch instead of refetched
    pub deduped_fetches: u64,
}

/// Snapshot returned by [`ConcurrentCache::get_concurrent_cache_stats`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConcurrentStats {
    pub cache: CacheStats,
    pub operations: OperationCounters,
    pub pending: usize,
    pub in_flight: usize,
}

type SharedFetch = Shared<BoxFuture<'static, EntityResult>>;

struct InFlight {
    ticket: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct CoordinatorState {
    pending: HashMap<(OperationKind, String), PendingOperation>,
    in_flight: HashMap<String, InFlight>,
    /// Ticket of the last applied write per driver
    committed: HashMap<String, u64>,
    /// Unsettled `set_concurrent` calls per driver, independent of sweeps
    live_writes: HashMap<String, usize>,
}

/// Cache-first access with per-driver in-flight tracking
pub struct ConcurrentCache {
    cache: EntityCache,
    state: Mutex<CoordinatorState>,
    next_ticket: AtomicU64,
    gets: AtomicU64,
    sets: AtomicU64,
    deduped_sets: AtomicU64,
    deduped_fetches: AtomicU64,
}

impl ConcurrentCache {
    /// Coordinate access to an entity cache
    pub fn new(cache: EntityCache) -> Self {
        Self {
            cache,
            state: Mutex::new(CoordinatorState::default()),
            next_ticket: AtomicU64::new(1),
            gets: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deduped_sets: AtomicU64::new(0),
            deduped_fetches: AtomicU64::new(0),
        }
    }

    /// Underlying entity cache
    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    /// Partition drivers into cached and uncached
    ///
    /// Nothing is written or tracked beyond the read counter. Duplicate ids
    /// collapse to one entry. Invalid ids land in neither side and are
    /// counted as errors.
    pub fn split_cached_and_uncached<S: AsRef<str>>(&self, ids: &[S]) -> SplitResult {
        let lookup = self.cache.get_many(ids);
        self.gets.fetch_add(
            (lookup.stats.hits + lookup.stats.misses) as u64,
            Ordering::Relaxed,
        );

        let mut seen = HashSet::new();
        let uncached: Vec<String> = ids
            .iter()
            .map(|id| id.as_ref())
            .filter(|id| valid_entity_id(id).is_some() && !lookup.data.contains_key(*id))
            .filter(|id| seen.insert(*id))
            .map(String::from)
            .collect();

        let cached = lookup.data;
        let total = cached.len() + uncached.len();
        let cache_hit_rate = if total == 0 {
            "0%".to_string()
        } else {
            format_rate(percentage(cached.len() as u64, total as u64))
        };

        debug!(
            "Split {} drivers: {} cached, {} uncached",
            total,
            cached.len(),
            uncached.len()
        );

        SplitResult {
            stats: SplitStats {
                total,
                cached: cached.len(),
                uncached: uncached.len(),
                errors: lookup.stats.errors,
                cache_hit_rate,
            },
            cached,
            uncached,
        }
    }

    /// Read a driver, never observing a half-applied write
    pub fn get_concurrent(&self, id: &str) -> Option<Record> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        let _state = self.lock();
        self.cache.get_entity(id)
    }

    /// Write a driver's record with last-writer-wins ordering
    ///
    /// The pending operation is registered when this method is called, not
    /// when the returned future is first polled, and call order decides
    /// which write survives. A write overtaken by a later call is skipped
    /// and reported as success, since the later value is what callers see.
    pub fn set_concurrent<'a>(
        &'a self,
        id: &'a str,
        record: &'a Record,
    ) -> impl Future<Output = bool> + Send + 'a {
        let registration = valid_entity_id(id).map(|id| {
            self.sets.fetch_add(1, Ordering::Relaxed);
            let ticket = self.take_ticket();
            let write = self.register_write(id);
            (ticket, write, self.begin(OperationKind::Set, id))
        });

        async move {
            let Some((ticket, _write, _pending)) = registration else {
                warn!("Rejected concurrent write for invalid driver id {:?}", id);
                return false;
            };

            // Apply on the next scheduler turn so back-to-back setters coalesce
            tokio::task::yield_now().await;

            let mut state = self.lock();
            let latest = state.committed.get(id).copied().unwrap_or(0);
            if ticket < latest {
                debug!("Write {} for {} superseded by {}", ticket, id, latest);
                return true;
            }

            let written = self.cache.set_entity(id, record);
            if written {
                state.committed.insert(id.to_string(), ticket);
            }
            written
        }
    }

    /// Claim drivers for fetching
    ///
    /// Drivers nobody is fetching become leases owned by the caller, who
    /// must complete them. Drivers already in flight elsewhere are returned
    /// as futures resolving to that fetch's result.
    pub fn claim_fetches(&self, ids: &[String]) -> FetchClaims<'_> {
        let mut claims = FetchClaims {
            owned: Vec::new(),
            joined: Vec::new(),
        };

        for id in ids {
            if valid_entity_id(id).is_none() {
                continue;
            }

            let mut state = self.lock();
            if let Some(in_flight) = state.in_flight.get(id) {
                debug!("Joining in-flight fetch for {}", id);
                self.deduped_fetches.fetch_add(1, Ordering::Relaxed);
                claims.joined.push((id.clone(), in_flight.fetch.clone()));
                continue;
            }

            let (tx, rx) = oneshot::channel::<EntityResult>();
            let abandoned_id = id.clone();
            let fetch = rx
                .map(move |result| {
                    result.unwrap_or_else(|_| {
                        EntityResult::Failed(
                            FetchError::new(format!(
                                "Fetch for {} was abandoned before it settled",
                                abandoned_id
                            ))
                            .with_kind(ErrorKind::Unknown),
                        )
                    })
                })
                .boxed()
                .shared();

            let ticket = self.take_ticket();
            state
                .in_flight
                .insert(id.clone(), InFlight { ticket, fetch });
            drop(state);

            claims.owned.push(FetchLease {
                coordinator: self,
                key: id.clone(),
                ticket,
                tx: Some(tx),
                _pending: self.begin(OperationKind::Get, id),
            });
        }

        claims
    }

    /// Drop pending markers older than `max_age`, or all when `None`
    ///
    /// Compensating sweep for operations that never settled. In-flight
    /// fetches whose marker is swept stop accepting new joiners. Clearing a
    /// marker that already settled is a no-op.
    pub fn cleanup_pending_operations(&self, max_age: Option<Duration>) -> usize {
        let now = self.cache.store().clock().now();
        let mut state = self.lock();

        let stale: Vec<(OperationKind, String)> = state
            .pending
            .iter()
            .filter(|(_, op)| max_age.is_none_or(|age| now - op.started_at > age))
            .map(|(slot, _)| slot.clone())
            .collect();

        for slot in &stale {
            state.pending.remove(slot);
            if slot.0 == OperationKind::Get {
                state.in_flight.remove(&slot.1);
            }
        }

        if !stale.is_empty() {
            info!("Cleared {} stale pending operations", stale.len());
        }
        stale.len()
    }

    /// Snapshot of outstanding operations
    pub fn pending_operations(&self) -> Vec<PendingOperation> {
        let mut ops: Vec<_> = self.lock().pending.values().cloned().collect();
        ops.sort_by(|a, b| a.key.cmp(&b.key));
        ops
    }

    /// Whether a driver has any outstanding operation
    pub fn is_pending(&self, id: &str) -> bool {
        let state = self.lock();
        state
            .pending
            .contains_key(&(OperationKind::Set, id.to_string()))
            || state
                .pending
                .contains_key(&(OperationKind::Get, id.to_string()))
    }

    /// Cache stats combined with coordinator counters
    pub fn get_concurrent_cache_stats(&self) -> ConcurrentStats {
        let (pending, in_flight) = {
            let state = self.lock();
            (state.pending.len(), state.in_flight.len())
        };

        ConcurrentStats {
            cache: self.cache.stats(),
            operations: OperationCounters {
                gets: self.gets.load(Ordering::Relaxed),
                sets: self.sets.load(Ordering::Relaxed),
                deduped_sets: self.deduped_sets.load(Ordering::Relaxed),
                deduped_fetches: self.deduped_fetches.load(Ordering::Relaxed),
            },
            pending,
            in_flight,
        }
    }

    fn take_ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::Relaxed)
    }

    fn begin(&self, kind: OperationKind, key: &str) -> PendingGuard<'_> {
        let now = self.cache.store().clock().now();
        let mut state = self.lock();
        let slot = (kind, key.to_string());

        let generation = match state.pending.get_mut(&slot) {
            Some(op) => {
                if kind == OperationKind::Set {
                    self.deduped_sets.fetch_add(1, Ordering::Relaxed);
                }
                op.outstanding += 1;
                op.generation
            }
            None => {
                let generation = self.take_ticket();
                state.pending.insert(
                    slot.clone(),
                    PendingOperation {
                        key: key.to_string(),
                        kind,
                        started_at: now,
                        outstanding: 1,
                        generation,
                    },
                );
                generation
            }
        };

        PendingGuard {
            coordinator: self,
            slot,
            generation,
        }
    }

    fn finish(&self, slot: &(OperationKind, String), generation: u64) {
        let mut state = self.lock();
        let Some(op) = state.pending.get_mut(slot) else {
            // Already swept
            return;
        };
        if op.generation != generation {
            // Swept, and the slot now belongs to a newer operation
            return;
        }

        op.outstanding = op.outstanding.saturating_sub(1);
        if op.outstanding == 0 {
            state.pending.remove(slot);
        }
    }

    fn register_write(&self, key: &str) -> WriteRegistration<'_> {
        *self.lock().live_writes.entry(key.to_string()).or_insert(0) += 1;
        WriteRegistration {
            coordinator: self,
            key: key.to_string(),
        }
    }

    /// The committed ticket outlives every write that could still lose to it
    fn release_write(&self, key: &str) {
        let mut state = self.lock();
        let Some(live) = state.live_writes.get_mut(key) else {
            return;
        };

        *live = live.saturating_sub(1);
        if *live == 0 {
            state.live_writes.remove(key);
            state.committed.remove(key);
        }
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases a pending marker when dropped
struct PendingGuard<'a> {
    coordinator: &'a ConcurrentCache,
    slot: (OperationKind, String),
    generation: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.finish(&self.slot, self.generation);
    }
}

/// Keeps a driver's committed ticket alive until this write settles
///
/// Unlike [`PendingGuard`] this is never swept, so a write whose pending
/// marker was cleared still loses to any later call that already landed.
struct WriteRegistration<'a> {
    coordinator: &'a ConcurrentCache,
    key: String,
}

impl Drop for WriteRegistration<'_> {
    fn drop(&mut self) {
        self.coordinator.release_write(&self.key);
    }
}

/// Outcome of [`ConcurrentCache::claim_fetches`]
pub struct FetchClaims<'a> {
    /// Drivers this caller must fetch
    pub owned: Vec<FetchLease<'a>>,
    /// Drivers being fetched by someone else
    pub joined: Vec<(String, Shared<BoxFuture<'static, EntityResult>>)>,
}

/// Exclusive right to fetch one driver
///
/// Completing the lease wakes every joiner. Dropping it uncompleted
/// resolves joiners with an "abandoned" failure. Either way the in-flight
/// slot and pending marker are released.
pub struct FetchLease<'a> {
    coordinator: &'a ConcurrentCache,
    key: String,
    ticket: u64,
    tx: Option<oneshot::Sender<EntityResult>>,
    _pending: PendingGuard<'a>,
}

impl FetchLease<'_> {
    /// Driver this lease covers
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Publish the result to joiners and release the lease
    pub fn complete(mut self, result: EntityResult) {
        if let Some(tx) = self.tx.take() {
            // Joiners may all have gone away
            let _ = tx.send(result);
        }
    }
}

impl Drop for FetchLease<'_> {
    fn drop(&mut self) {
        let mut state = self.coordinator.lock();
        if state
            .in_flight
            .get(&self.key)
            .is_some_and(|f| f.ticket == self.ticket)
        {
            state.in_flight.remove(&self.key);
        }
    }
}
