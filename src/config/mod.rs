//! Configuration for Pitwall
//!
//! The config file lives at `<config_dir>/pitwall/config.toml` unless
//! `--config` or `PITWALL_CONFIG` points elsewhere. Relative paths inside
//! the file (`cache.dir`, `fetch.fixture`) are resolved against the
//! directory holding the file, so a config can travel with its fixture.

pub mod schema;

pub use schema::Config;

use crate::error::{PitwallError, PitwallResult};
use schema::{CacheConfig, FetchConfig};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Loads and saves the config file and resolves the paths it names
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Manager for the default config location
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Manager for an explicit config file
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pitwall")
            .join("config.toml")
    }

    /// Where cached profiles go when `cache.dir` is unset
    pub fn default_cache_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pitwall")
            .join("cache")
    }

    /// Directory for the `dir` cache backend
    pub fn cache_dir(&self, cache: &CacheConfig) -> PathBuf {
        match &cache.dir {
            Some(dir) => self.resolve(dir),
            None => Self::default_cache_dir(),
        }
    }

    /// Fixture for a `drivers` run
    ///
    /// An explicit path (flag or `PITWALL_FIXTURE`) is taken as given;
    /// `fetch.fixture` is resolved relative to the config file.
    pub fn fixture_path(
        &self,
        explicit: Option<PathBuf>,
        fetch: &FetchConfig,
    ) -> PitwallResult<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path);
        }

        fetch
            .fixture
            .as_deref()
            .map(|path| self.resolve(path))
            .ok_or(PitwallError::FixtureMissing)
    }

    /// Load the config file, or defaults when there is none
    pub async fn load(&self) -> PitwallResult<Config> {
        if !self.config_path.exists() {
            debug!(
                "No config at {}, using defaults",
                self.config_path.display()
            );
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&self.config_path).await.map_err(|e| {
            PitwallError::io(
                format!("reading config from {}", self.config_path.display()),
                e,
            )
        })?;

        toml::from_str(&content).map_err(|e| PitwallError::ConfigInvalid {
            path: self.config_path.clone(),
            reason: e.to_string(),
        })
    }

    /// Write `config` to the config file, creating its directory
    pub async fn save(&self, config: &Config) -> PitwallResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PitwallError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            PitwallError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.config_path.parent() {
            Some(base) => base.join(path),
            None => path.to_path_buf(),
        }
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.cache.ttl_secs, 3600);
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.cache.namespace = "test:".to_string();

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded.cache.namespace, "test:");
    }

    #[tokio::test]
    async fn invalid_toml_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[cache\nttl_secs = ").unwrap();

        let err = ConfigManager::with_path(path).load().await.unwrap_err();
        assert!(matches!(err, PitwallError::ConfigInvalid { .. }));
    }

    #[test]
    fn cache_dir_resolves_against_config_file() {
        let manager = ConfigManager::with_path(PathBuf::from("/etc/pitwall/config.toml"));

        let relative = CacheConfig {
            dir: Some(PathBuf::from("profiles")),
            ..Default::default()
        };
        assert_eq!(
            manager.cache_dir(&relative),
            PathBuf::from("/etc/pitwall/profiles")
        );

        let absolute = CacheConfig {
            dir: Some(PathBuf::from("/var/cache/pitwall")),
            ..Default::default()
        };
        assert_eq!(
            manager.cache_dir(&absolute),
            PathBuf::from("/var/cache/pitwall")
        );

        assert_eq!(
            manager.cache_dir(&CacheConfig::default()),
            ConfigManager::default_cache_dir()
        );
    }

    #[test]
    fn fixture_path_prefers_explicit() {
        let manager = ConfigManager::with_path(PathBuf::from("/etc/pitwall/config.toml"));
        let fetch = FetchConfig {
            fixture: Some(PathBuf::from("drivers.json")),
            ..Default::default()
        };

        assert_eq!(
            manager
                .fixture_path(Some(PathBuf::from("other.json")), &fetch)
                .unwrap(),
            PathBuf::from("other.json")
        );
        assert_eq!(
            manager.fixture_path(None, &fetch).unwrap(),
            PathBuf::from("/etc/pitwall/drivers.json")
        );
        assert!(matches!(
            manager.fixture_path(None, &FetchConfig::default()),
            Err(PitwallError::FixtureMissing)
        ));
    }
}
