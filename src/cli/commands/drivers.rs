//! Drivers command - cache-first profile lookups

use crate::cli::args::{DriversArgs, OutputFormat};
use crate::config::{Config, ConfigManager};
use crate::error::{PitwallError, PitwallResult};
use crate::faults::recorder::format_rate;
use crate::faults::AggregateErrorStats;
use crate::fetch::{FixtureFetcher, RenderSink};
use crate::model::{parse_driver_names, EntityResult};
use crate::service::{BatchOutcome, DriverService};
use crate::ui::{self, FetchProgress, UiContext};
use console::style;
use tracing::debug;

/// Execute the drivers command
pub async fn execute(
    args: DriversArgs,
    config: &Config,
    manager: &ConfigManager,
) -> PitwallResult<()> {
    let ctx = UiContext::detect();

    let names: Vec<String> = args
        .names
        .iter()
        .flat_map(|raw| parse_driver_names(raw))
        .collect();
    if names.is_empty() {
        return Err(PitwallError::NoDrivers);
    }

    let fixture = manager.fixture_path(args.fixture, &config.fetch)?;
    let fetcher = FixtureFetcher::load(&fixture).await?;

    let mut service = DriverService::from_config(&config.cache, manager)?;
    if let Some(timeout) = config.fetch.timeout() {
        service = service.with_fetch_timeout(timeout);
    }

    if args.refresh {
        for name in &names {
            service.cache().invalidate(name);
        }
        debug!("Dropped {} cached profiles for refresh", names.len());
    }

    let sink = ConsoleSink::new(&ctx, args.format, names.len());
    let outcome = service.fetch_drivers(&names, &fetcher, &sink).await;
    sink.finish();

    let maintenance = service.run_maintenance(config.cache.pending_stale_after());
    debug!(
        "Maintenance removed {} expired entries, cleared {} pending operations",
        maintenance.expired.removed, maintenance.pending_cleared
    );

    let error_stats = service.recorder().get_error_stats();
    match args.format {
        OutputFormat::Table => print_summary(&ctx, &outcome, &error_stats),
        OutputFormat::Json => print_json(&outcome, &error_stats)?,
        OutputFormat::Plain => print_plain(&outcome),
    }

    Ok(())
}

/// Renders each driver as it settles
struct ConsoleSink {
    ctx: UiContext,
    enabled: bool,
    progress: FetchProgress,
}

impl ConsoleSink {
    fn new(ctx: &UiContext, format: OutputFormat, total: usize) -> Self {
        let enabled = format == OutputFormat::Table;
        let progress = if enabled {
            FetchProgress::new(ctx, total as u64)
        } else {
            FetchProgress::hidden()
        };

        Self {
            ctx: ctx.clone(),
            enabled,
            progress,
        }
    }

    fn finish(&self) {
        self.progress.finish();
    }
}

impl RenderSink for ConsoleSink {
    fn render(&self, id: &str, result: &EntityResult) {
        if !self.enabled {
            return;
        }

        self.progress.suspend(|| match result {
            EntityResult::Found(record) => {
                ui::step_ok_detail(&self.ctx, id, &describe_profile(record));
            }
            EntityResult::Failed(err) => ui::step_error_detail(&self.ctx, id, &err.to_string()),
        });
        self.progress.inc();
    }
}

/// Short one-line description of a profile
fn describe_profile(record: &serde_json::Value) -> String {
    let name = record
        .get("display_name")
        .and_then(|v| v.as_str())
        .unwrap_or("profile");

    match record.get("cust_id").and_then(|v| v.as_u64()) {
        Some(cust_id) => format!("{} #{}", name, cust_id),
        None => name.to_string(),
    }
}

fn print_summary(ctx: &UiContext, outcome: &BatchOutcome, errors: &AggregateErrorStats) {
    let report = &outcome.report;

    ui::section(ctx, "Batch");
    ui::key_value(ctx, "Requested", &report.requested.to_string());
    ui::key_value(ctx, "Cache hit rate", &outcome.cache_hit_rate);
    ui::key_value(
        ctx,
        "Cached / fetched",
        &format!("{} / {}", outcome.stats.hits, outcome.stats.misses),
    );
    ui::key_value_status(
        ctx,
        "Succeeded",
        &format!(
            "{} ({})",
            report.successes,
            format_rate(report.success_rate)
        ),
        report.failures == 0,
    );
    if report.failures > 0 {
        ui::key_value_status(
            ctx,
            "Failed",
            &format!("{} ({})", report.failures, format_rate(report.failure_rate)),
            false,
        );
        for (id, message) in &report.messages {
            ui::remark(ctx, &format!("{}: {}", id, message));
        }
    }
    if !report.missing.is_empty() {
        ui::step_warn_hint(
            ctx,
            &format!("{} drivers returned no result", report.missing.len()),
            &report.missing.join(", "),
        );
    }
    if outcome.stats.errors > 0 {
        ui::key_value_status(ctx, "Errors", &outcome.stats.errors.to_string(), false);
    }

    if errors.total_errors > 0 {
        ui::section(ctx, "Errors by kind");
        for (kind, count) in &errors.error_breakdown {
            ui::key_value(ctx, &kind.to_string(), &count.to_string());
        }
    }

    if report.failures == 0 && report.missing.is_empty() {
        ui::outro_success(ctx, "All drivers loaded");
    } else {
        ui::outro_warn(ctx, "Some drivers could not be loaded");
    }
}

fn print_json(outcome: &BatchOutcome, errors: &AggregateErrorStats) -> PitwallResult<()> {
    let doc = serde_json::json!({
        "drivers": outcome.results,
        "stats": outcome.stats,
        "cache_hit_rate": outcome.cache_hit_rate,
        "report": outcome.report,
        "errors": errors,
    });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

fn print_plain(outcome: &BatchOutcome) {
    for (id, result) in &outcome.results {
        let status = match result {
            EntityResult::Found(_) => style("ok").green(),
            EntityResult::Failed(_) => style("error").red(),
        };
        println!("{}\t{}", id, status);
    }
    for id in &outcome.report.missing {
        println!("{}\t{}", id, style("missing").yellow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn describe_profile_formats() {
        assert_eq!(
            describe_profile(&json!({"display_name": "Max", "cust_id": 33})),
            "Max #33"
        );
        assert_eq!(describe_profile(&json!({"display_name": "Max"})), "Max");
        assert_eq!(describe_profile(&json!({})), "profile");
    }

    #[test]
    fn sink_is_silent_outside_table_mode() {
        let ctx = UiContext::non_interactive();
        let sink = ConsoleSink::new(&ctx, OutputFormat::Json, 1);
        sink.render("a", &EntityResult::Found(json!({})));
        sink.finish();
    }
}
