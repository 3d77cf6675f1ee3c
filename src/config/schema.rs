//! Configuration schema for Pitwall
//!
//! Configuration is stored at `~/.config/pitwall/config.toml`

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Profile cache settings
    pub cache: CacheConfig,

    /// Profile fetch settings
    pub fetch: FetchConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Where cached profiles live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// One file per driver under the state directory
    #[default]
    Dir,
    /// In-process only, gone when the process exits
    Memory,
}

impl fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dir => write!(f, "dir"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Profile cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Key prefix for every cached driver
    pub namespace: String,

    /// Seconds a cached profile stays valid (default: 1 hour)
    pub ttl_secs: u64,

    /// Storage backend
    pub backend: CacheBackend,

    /// Directory for the dir backend (default: state dir)
    pub dir: Option<PathBuf>,

    /// Pending operations older than this are swept by maintenance
    pub pending_stale_after_secs: u64,
}

impl CacheConfig {
    /// Entry lifetime as a duration
    pub fn ttl(&self) -> Duration {
        seconds(self.ttl_secs)
    }

    /// Age after which a pending operation counts as abandoned
    pub fn pending_stale_after(&self) -> Duration {
        seconds(self.pending_stale_after_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "pitwall:driver:".to_string(),
            ttl_secs: 3600,
            backend: CacheBackend::Dir,
            dir: None,
            pending_stale_after_secs: 300,
        }
    }
}

/// Profile fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Fixture file used when --fixture is not given
    pub fixture: Option<PathBuf>,

    /// Seconds before a batch fetch is abandoned (0 = no limit)
    pub timeout_secs: u64,
}

impl FetchConfig {
    /// Batch fetch limit, if any
    pub fn timeout(&self) -> Option<std::time::Duration> {
        (self.timeout_secs > 0).then(|| std::time::Duration::from_secs(self.timeout_secs))
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            fixture: None,
            timeout_secs: 30,
        }
    }
}

fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[cache]"));
        assert!(toml.contains("backend = \"dir\""));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.cache.ttl_secs, 3600);
        assert_eq!(config.cache.namespace, "pitwall:driver:");
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [cache]
            backend = "memory"
            ttl_secs = 60
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.ttl(), Duration::seconds(60));
        assert_eq!(config.fetch.timeout_secs, 30); // default preserved
    }

    #[test]
    fn huge_ttl_saturates() {
        let config = CacheConfig {
            ttl_secs: u64::MAX,
            ..Default::default()
        };
        assert_eq!(config.ttl(), Duration::MAX);
    }

    #[test]
    fn zero_timeout_disables_limit() {
        let fetch = FetchConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert!(fetch.timeout().is_none());
        assert_eq!(
            FetchConfig::default().timeout(),
            Some(std::time::Duration::from_secs(30))
        );
    }
}
