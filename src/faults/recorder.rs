//! Error log and success/failure accounting
//!
//! The recorder is an explicit metrics context: the service owns one and
//! every counter lives behind a single lock, so a reset is observed either
//! fully or not at all.

use super::kind::ErrorKind;
use crate::model::{valid_entity_id, EntityResult, FetchError};
use crate::store::Clock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const INVALID_ENTITY: &str = "<invalid>";
const GENERIC_MESSAGE: &str = "Unexpected error while loading driver";

/// One recorded per-entity failure
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub id: Uuid,
    pub entity: String,
    pub kind: ErrorKind,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Aggregate view derived from the error log on every call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateErrorStats {
    /// Successes plus recorded errors
    pub total_drivers: u64,
    pub total_errors: u64,
    pub successes: u64,
    /// Percentage in `0.0..=100.0`
    pub success_rate: f64,
    /// Percentage in `0.0..=100.0`
    pub failure_rate: f64,
    pub error_breakdown: BTreeMap<ErrorKind, u64>,
    /// Entities whose recording itself failed
    pub internal_failures: u64,
}

/// Outcome accounting for one batch
///
/// Rates are computed against `requested`, not `returned`. Ids missing
/// from the result map count as neither success nor failure and are
/// listed in `missing`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub requested: usize,
    pub returned: usize,
    pub successes: usize,
    pub failures: usize,
    /// Entities whose recording failed internally
    pub errors: usize,
    pub missing: Vec<String>,
    /// Normalized message per failed entity
    pub messages: BTreeMap<String, String>,
    pub success_rate: f64,
    pub failure_rate: f64,
}

impl BatchReport {
    /// Whether the result map disagrees with the request
    pub fn has_denominator_mismatch(&self) -> bool {
        self.returned != self.requested || !self.missing.is_empty()
    }
}

#[derive(Debug, Default)]
struct ErrorLog {
    records: Vec<ErrorRecord>,
    successes: u64,
    internal_failures: u64,
}

/// Process-lifetime error log owned by the orchestrator
pub struct ErrorRecorder {
    clock: Arc<dyn Clock>,
    log: Mutex<ErrorLog>,
}

impl ErrorRecorder {
    /// Create an empty recorder
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            log: Mutex::new(ErrorLog::default()),
        }
    }

    /// Classify and record a failure, returning the user-facing message
    ///
    /// Never panics on bad input: an invalid id is recorded as `unknown`
    /// with a generic message.
    pub fn handle_entity_error(&self, error: &FetchError, id: &str) -> String {
        let (entity, kind, message) = match valid_entity_id(id) {
            Some(id) => {
                let kind = ErrorKind::classify(error);
                (id.to_string(), kind, kind.user_message(id))
            }
            None => {
                warn!("Recording failure for invalid driver id {:?}", id);
                (
                    INVALID_ENTITY.to_string(),
                    ErrorKind::Unknown,
                    GENERIC_MESSAGE.to_string(),
                )
            }
        };

        warn!("Driver {} failed ({}): {}", entity, kind, error);

        let record = ErrorRecord {
            id: Uuid::new_v4(),
            entity,
            kind,
            message: message.clone(),
            occurred_at: self.clock.now(),
        };
        self.lock().records.push(record);

        message
    }

    /// Count a settled success
    pub fn mark_entity_success(&self, id: &str) {
        if valid_entity_id(id).is_none() {
            warn!("Ignoring success for invalid driver id {:?}", id);
            return;
        }
        self.lock().successes += 1;
        debug!("Driver {} settled successfully", id);
    }

    /// Record every result in a batch and compute its rates
    pub fn process_batch_results(
        &self,
        results: &BTreeMap<String, EntityResult>,
        requested_ids: &[String],
    ) -> BatchReport {
        self.settle_each(results, requested_ids, |id, result| match result {
            EntityResult::Found(_) => {
                self.mark_entity_success(id);
                Ok(())
            }
            EntityResult::Failed(err) => Err(self.handle_entity_error(err, id)),
        })
    }

    /// Run `record` for each result with per-entity containment
    fn settle_each<F>(
        &self,
        results: &BTreeMap<String, EntityResult>,
        requested_ids: &[String],
        record: F,
    ) -> BatchReport
    where
        F: Fn(&str, &EntityResult) -> Result<(), String>,
    {
        let mut report = BatchReport {
            requested: requested_ids.len(),
            returned: results.len(),
            ..Default::default()
        };

        for (id, result) in results {
            match panic::catch_unwind(AssertUnwindSafe(|| record(id, result))) {
                Ok(Ok(())) => report.successes += 1,
                Ok(Err(message)) => {
                    report.failures += 1;
                    report.messages.insert(id.clone(), message);
                }
                Err(_) => {
                    error!("Recording result for driver {} failed internally", id);
                    report.errors += 1;
                    self.lock().internal_failures += 1;
                }
            }
        }

        report.missing = requested_ids
            .iter()
            .filter(|id| !results.contains_key(id.as_str()))
            .cloned()
            .collect();

        report.success_rate = percentage(report.successes as u64, report.requested as u64);
        report.failure_rate = percentage(report.failures as u64, report.requested as u64);

        if report.has_denominator_mismatch() {
            warn!(
                "Batch returned {} results for {} requested drivers ({} missing)",
                report.returned,
                report.requested,
                report.missing.len()
            );
        }

        info!(
            "Batch settled: {} ok, {} failed, {} internal errors of {} requested",
            report.successes, report.failures, report.errors, report.requested
        );
        report
    }

    /// Snapshot of aggregate counters, derived from the log
    pub fn get_error_stats(&self) -> AggregateErrorStats {
        let log = self.lock();

        let mut error_breakdown = BTreeMap::new();
        for record in &log.records {
            *error_breakdown.entry(record.kind).or_insert(0) += 1;
        }

        let total_errors = log.records.len() as u64;
        let total_drivers = log.successes + total_errors;

        AggregateErrorStats {
            total_drivers,
            total_errors,
            successes: log.successes,
            success_rate: percentage(log.successes, total_drivers),
            failure_rate: percentage(total_errors, total_drivers),
            error_breakdown,
            internal_failures: log.internal_failures,
        }
    }

    /// Most recent failures, newest first
    pub fn recent_errors(&self, limit: usize) -> Vec<ErrorRecord> {
        self.lock().records.iter().rev().take(limit).cloned().collect()
    }

    /// Zero every counter and clear the log in one step
    pub fn reset_error_stats(&self) {
        *self.lock() = ErrorLog::default();
        debug!("Error stats reset");
    }

    fn lock(&self) -> MutexGuard<'_, ErrorLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `part / whole` as a percentage, zero when `whole` is zero
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Format a percentage with one decimal, e.g. `50.0%`
pub fn format_rate(rate: f64) -> String {
    format!("{:.1}%", rate)
}
