//! Cache command - inspect and prune cached driver profiles

use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::{Config, ConfigManager};
use crate::error::PitwallResult;
use crate::service::DriverService;
use crate::store::CacheEntry;
use crate::ui::{self, UiContext};
use chrono::Utc;
use console::style;
use tracing::debug;

/// Execute the cache command
pub async fn execute(
    args: CacheArgs,
    config: &Config,
    manager: &ConfigManager,
) -> PitwallResult<()> {
    let service = DriverService::from_config(&config.cache, manager)?;

    match args.action {
        CacheAction::List { format } => list_entries(&service, format)?,
        CacheAction::Info => show_info(&service, config, manager),
        CacheAction::Sweep => sweep(&service, config),
        CacheAction::Forget { name } => forget(&service, &name),
        CacheAction::Clear { yes } => clear(&service, yes).await?,
    }

    Ok(())
}

fn list_entries(service: &DriverService, format: OutputFormat) -> PitwallResult<()> {
    let entries = service.cache().store().entries();

    match format {
        OutputFormat::Table => print_entry_table(service, &entries),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Plain => {
            for entry in &entries {
                println!("{}", entry.key);
            }
        }
    }

    Ok(())
}

fn print_entry_table(service: &DriverService, entries: &[CacheEntry]) {
    if entries.is_empty() {
        println!("No cached drivers.");
        return;
    }

    let now = Utc::now();
    let ttl = service.cache().store().ttl();

    println!("{:<32} {:<20} {:<12}", "DRIVER", "STORED", "EXPIRES IN");
    println!("{}", "-".repeat(64));

    for entry in entries {
        let expires = match time_left(ttl, now.signed_duration_since(entry.stored_at)) {
            None => style("never".to_string()).dim().to_string(),
            Some(remaining) if remaining.num_seconds() <= 60 => {
                style("<1m".to_string()).yellow().to_string()
            }
            Some(remaining) => format_remaining(remaining),
        };

        println!(
            "{:<32} {:<20} {:<12}",
            entry.key,
            entry.stored_at.format("%Y-%m-%d %H:%M"),
            expires
        );
    }

    println!();
    println!("Total: {} driver(s)", entries.len());
}

/// Time until expiry, `None` when it overflows (effectively unbounded TTL)
fn time_left(ttl: chrono::Duration, age: chrono::Duration) -> Option<chrono::Duration> {
    ttl.checked_sub(&age)
}

fn format_remaining(remaining: chrono::Duration) -> String {
    let minutes = remaining.num_minutes();
    if minutes >= 60 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else {
        format!("{}m", minutes)
    }
}

fn show_info(service: &DriverService, config: &Config, manager: &ConfigManager) {
    let ctx = UiContext::detect();
    let stats = service.cache().stats();

    ui::intro(&ctx, "Driver cache");
    ui::key_value(&ctx, "Backend", &stats.backend);
    if stats.backend == "dir" {
        ui::key_value(
            &ctx,
            "Directory",
            &manager.cache_dir(&config.cache).display().to_string(),
        );
    }
    ui::key_value(&ctx, "Namespace", &stats.namespace);
    ui::key_value(&ctx, "TTL", &format!("{}s", stats.ttl_secs));
    ui::key_value(&ctx, "Entries", &stats.usage.entries.to_string());
    ui::key_value(&ctx, "Size", &format!("{} bytes", stats.usage.bytes));
}

fn sweep(service: &DriverService, config: &Config) {
    let ctx = UiContext::detect();
    let report = service.run_maintenance(config.cache.pending_stale_after());
    let expired = report.expired;

    if expired.removed == 0 && expired.errors == 0 {
        ui::step_info(
            &ctx,
            &format!("Nothing to sweep ({} entries checked)", expired.scanned),
        );
        return;
    }

    ui::step_ok(
        &ctx,
        &format!("Removed {} of {} entries", expired.removed, expired.scanned),
    );
    if expired.errors > 0 {
        ui::step_warn(&ctx, &format!("{} unreadable entries", expired.errors));
    }
    if expired.delete_failures > 0 {
        ui::step_warn_hint(
            &ctx,
            &format!("{} entries could not be deleted", expired.delete_failures),
            "Check permissions on the cache directory",
        );
    }
}

fn forget(service: &DriverService, name: &str) {
    let ctx = UiContext::detect();
    let name = name.trim();

    // Expired entries still on disk are removed too
    if service.cache().invalidate(name) {
        ui::step_ok(&ctx, &format!("Forgot {}", name));
    } else {
        ui::step_error_detail(&ctx, name, "could not be removed");
    }
}

async fn clear(service: &DriverService, yes: bool) -> PitwallResult<()> {
    let ctx = UiContext::detect().with_auto_yes(yes);
    let usage = service.cache().store().usage();

    if usage.entries == 0 {
        println!("No cached drivers to clear.");
        return Ok(());
    }

    let question = format!("Remove {} cached driver(s)?", usage.entries);
    if !ui::confirm(&ctx, &question, false).await? {
        println!("Aborted.");
        return Ok(());
    }

    let removed = service.cache().store().clear();
    debug!("Cleared {} of {} cache entries", removed, usage.entries);
    ui::step_ok(&ctx, &format!("Cleared {} driver(s)", removed));

    Ok(())
}
