//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::schema::CacheBackend;
use crate::config::{Config, ConfigManager};
use crate::error::{PitwallError, PitwallResult};
use crate::ui::{self, UiContext};
use std::path::PathBuf;

/// Keys accepted by `config set`
const VALID_KEYS: &[&str] = &[
    "general.verbose",
    "general.log_format",
    "cache.namespace",
    "cache.ttl_secs",
    "cache.backend",
    "cache.dir",
    "cache.pending_stale_after_secs",
    "fetch.fixture",
    "fetch.timeout_secs",
];

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> PitwallResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => set_value(manager, config, &key, &value).await?,
    }

    Ok(())
}

fn show_config(config: &Config) -> PitwallResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> PitwallResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok_detail(&ctx, "Configuration initialized", &path.display().to_string());

    Ok(())
}

async fn set_value(
    manager: &ConfigManager,
    config: &Config,
    key: &str,
    value: &str,
) -> PitwallResult<()> {
    let ctx = UiContext::detect();
    let mut config = config.clone();

    if let Err(e) = apply(&mut config, key, value) {
        ui::step_error_detail(&ctx, "Cannot set", key);
        if matches!(e, PitwallError::User(ref msg) if msg.starts_with("Unknown config key")) {
            ui::remark(&ctx, &format!("Valid keys: {}", VALID_KEYS.join(", ")));
        }
        return Err(e);
    }

    manager.save(&config).await?;
    ui::step_ok(&ctx, &format!("Set {} = {}", key, value));

    Ok(())
}

/// Apply one dotted key to a config
fn apply(config: &mut Config, key: &str, value: &str) -> PitwallResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "verbose"] => config.general.verbose = parse_bool(value)?,
        ["general", "log_format"] => {
            config.general.log_format = match value {
                "text" | "json" => value.to_string(),
                _ => {
                    return Err(PitwallError::User(format!(
                        "Invalid log format: {}. Use text or json",
                        value
                    )))
                }
            }
        }

        ["cache", "namespace"] => config.cache.namespace = value.to_string(),
        ["cache", "ttl_secs"] => config.cache.ttl_secs = parse_u64(value)?,
        ["cache", "backend"] => config.cache.backend = parse_backend(value)?,
        ["cache", "dir"] => config.cache.dir = optional_path(value),
        ["cache", "pending_stale_after_secs"] => {
            config.cache.pending_stale_after_secs = parse_u64(value)?
        }

        ["fetch", "fixture"] => config.fetch.fixture = optional_path(value),
        ["fetch", "timeout_secs"] => config.fetch.timeout_secs = parse_u64(value)?,

        _ => return Err(PitwallError::User(format!("Unknown config key: {}", key))),
    }

    Ok(())
}

/// Empty string unsets the path
fn optional_path(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    (!value.is_empty()).then(|| PathBuf::from(value))
}

fn parse_backend(value: &str) -> PitwallResult<CacheBackend> {
    match value.to_lowercase().as_str() {
        "dir" => Ok(CacheBackend::Dir),
        "memory" => Ok(CacheBackend::Memory),
        _ => Err(PitwallError::User(format!(
            "Invalid cache backend: {}. Use dir or memory",
            value
        ))),
    }
}

fn parse_bool(value: &str) -> PitwallResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(PitwallError::User(format!(
            "Invalid boolean value: {}. Use true/false",
            value
        ))),
    }
}

fn parse_u64(value: &str) -> PitwallResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| PitwallError::User(format!("Invalid number: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn apply_known_keys() {
        let mut config = Config::default();
        apply(&mut config, "cache.ttl_secs", "120").unwrap();
        apply(&mut config, "cache.backend", "memory").unwrap();
        apply(&mut config, "fetch.fixture", "/tmp/drivers.json").unwrap();
        apply(&mut config, "general.verbose", "yes").unwrap();

        assert_eq!(config.cache.ttl_secs, 120);
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.fetch.fixture, Some(PathBuf::from("/tmp/drivers.json")));
        assert!(config.general.verbose);

        apply(&mut config, "fetch.fixture", "").unwrap();
        assert!(config.fetch.fixture.is_none());
    }

    #[test]
    fn apply_rejects_bad_input() {
        let mut config = Config::default();
        assert!(apply(&mut config, "cache.colour", "red").is_err());
        assert!(apply(&mut config, "cache.ttl_secs", "soon").is_err());
        assert!(apply(&mut config, "cache.backend", "redis").is_err());
        assert!(apply(&mut config, "general.log_format", "xml").is_err());
        assert_eq!(config.cache.ttl_secs, 3600);
    }

    #[test]
    fn every_listed_key_is_settable() {
        let samples = [
            ("general.verbose", "false"),
            ("general.log_format", "json"),
            ("cache.namespace", "drv:"),
            ("cache.ttl_secs", "10"),
            ("cache.backend", "dir"),
            ("cache.dir", "/tmp/pitwall"),
            ("cache.pending_stale_after_secs", "5"),
            ("fetch.fixture", "drivers.json"),
            ("fetch.timeout_secs", "0"),
        ];
        assert_eq!(samples.len(), VALID_KEYS.len());

        let mut config = Config::default();
        for (key, value) in samples {
            assert!(VALID_KEYS.contains(&key));
            apply(&mut config, key, value).unwrap();
        }
    }

    #[tokio::test]
    async fn set_value_persists() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp.path().join("config.toml"));

        set_value(&manager, &Config::default(), "cache.ttl_secs", "42")
            .await
            .unwrap();

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.cache.ttl_secs, 42);
    }
}
