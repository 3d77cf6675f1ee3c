//! Time-bounded key/value storage
//!
//! The TTL store sits on top of an injected storage substrate and an
//! injected clock. Substrates only move strings around; the TTL store owns
//! the entry format, the namespace prefix and all expiry decisions.
//!
//! # Entry States
//!
//! | State | `get` | `remove_expired` |
//! |-------|-------|------------------|
//! | Live | value | kept |
//! | Expired | absent | removed |
//! | Corrupted | absent | removed, counted as error |

pub mod clock;
pub mod dir;
pub mod storage;
pub mod ttl;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dir::DirStorage;
pub use storage::{MemoryStorage, Storage};
pub use ttl::{CacheEntry, StoreUsage, SweepReport, TtlStore};
