//! Per-entity fault isolation and batch metrics
//!
//! Each entity moves independently from unknown to either success or
//! failure for a given batch. Failures are classified, logged to an
//! explicit error log owned by the caller, and never abort sibling
//! entities.

pub mod kind;
pub mod recorder;

pub use kind::ErrorKind;
pub use recorder::{AggregateErrorStats, BatchReport, ErrorRecord, ErrorRecorder};
