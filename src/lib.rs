//! Pitwall - cache-first driver profile lookups
//!
//! Resolves batches of racing-driver profiles through a TTL cache,
//! deduplicates concurrent fetches and isolates per-driver failures.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod faults;
pub mod fetch;
pub mod model;
pub mod service;
pub mod store;
pub mod ui;

pub use error::{PitwallError, PitwallResult};
