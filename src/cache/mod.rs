//! Driver profile caching
//!
//! [`EntityCache`] gives typed per-driver access to the TTL store.
//! [`ConcurrentCache`] layers in-flight tracking on top so concurrent
//! batches never race a stale overwrite or fetch the same driver twice.

pub mod coordinator;
pub mod entity;

pub use coordinator::{
    ConcurrentCache, ConcurrentStats, FetchClaims, FetchLease, OperationCounters, OperationKind,
    PendingOperation, SplitResult, SplitStats,
};
pub use entity::{CacheStats, EntityCache, LookupStats, ManyResult};
