//! Collaborators the cache layer calls out to
//!
//! The remote transport and the display are both outside this crate's
//! core. They plug in through [`DriverFetcher`] and [`RenderSink`].

pub mod fixture;

pub use fixture::FixtureFetcher;

use crate::error::PitwallResult;
use crate::model::EntityResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Source of fresh driver profiles
///
/// Per-driver failures belong in the returned map. An `Err` means the
/// whole batch never came back.
#[async_trait]
pub trait DriverFetcher: Send + Sync {
    /// Fetch a batch of drivers
    async fn fetch_batch(&self, ids: &[String]) -> PitwallResult<HashMap<String, EntityResult>>;

    /// Human-readable source name for display
    fn source_name(&self) -> &str;
}

/// Receives each driver as soon as it settles
pub trait RenderSink: Send + Sync {
    /// Display one settled driver
    fn render(&self, id: &str, result: &EntityResult);
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl RenderSink for NullSink {
    fn render(&self, _id: &str, _result: &EntityResult) {}
}

/// Sink that remembers what it was given, in order
#[derive(Debug, Default)]
pub struct CollectingSink {
    rendered: Mutex<Vec<(String, EntityResult)>>,
}

impl CollectingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything rendered so far
    pub fn rendered(&self) -> Vec<(String, EntityResult)> {
        self.rendered
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl RenderSink for CollectingSink {
    fn render(&self, id: &str, result: &EntityResult) {
        self.rendered
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((id.to_string(), result.clone()));
    }
}
