//! Cache configuration management.
//!
//! This module handles loading and saving the cache configuration, which
//! includes the source URL, payload shape, invalidation policy, timing and
//! the field names used to index records.
//!
//! Configuration is stored at `~/.config/tablecache/config.json`.

use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::source::PayloadShape;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "tablecache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Persisted table file name. Stable across runs so a restart with the
/// source unreachable can still start from the last good copy.
const CACHE_FILE: &str = "lookup_table.json";

/// Default refresh interval / TTL: 15 minutes.
const DEFAULT_REFRESH_SECS: u64 = 900;

/// Default connect and request timeout for the source.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Upper bound for refresh interval and TTL: one week.
pub const MAX_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Which invalidation policy drives refreshes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Background refresh on a fixed interval, install only on content change.
    #[default]
    Hash,
    /// Refresh on the read path once the TTL has lapsed.
    Expiry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source_url: String,
    pub payload: PayloadShape,
    pub policy: PolicyKind,
    pub refresh_interval_secs: u64,
    pub ttl_secs: u64,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Overrides the default persisted table location.
    pub cache_file: Option<PathBuf>,
    pub key_field: String,
    pub from_field: String,
    pub to_field: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_url: String::new(),
            payload: PayloadShape::Array,
            policy: PolicyKind::Hash,
            refresh_interval_secs: DEFAULT_REFRESH_SECS,
            ttl_secs: DEFAULT_REFRESH_SECS,
            connect_timeout_secs: DEFAULT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            cache_file: None,
            key_field: "country".to_string(),
            from_field: "branch".to_string(),
            to_field: "legal_entity".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Where the persisted table lives.
    ///
    /// Uses `cache_file` when set, otherwise the user cache directory, and
    /// falls back to the system temp directory when there is none.
    pub fn cache_path(&self) -> PathBuf {
        if let Some(ref path) = self.cache_file {
            return path.clone();
        }
        dirs::cache_dir()
            .map(|dir| dir.join(APP_NAME))
            .unwrap_or_else(std::env::temp_dir)
            .join(CACHE_FILE)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_url.trim().is_empty() {
            bail!("source_url is not configured");
        }
        if !(self.source_url.starts_with("http://") || self.source_url.starts_with("https://")) {
            bail!("source_url must be an http(s) URL: {}", self.source_url);
        }
        if self.refresh_interval_secs == 0 {
            bail!("refresh_interval_secs must be greater than zero");
        }
        if self.ttl_secs == 0 {
            bail!("ttl_secs must be greater than zero");
        }
        for (name, value) in [
            ("refresh_interval_secs", self.refresh_interval_secs),
            ("ttl_secs", self.ttl_secs),
        ] {
            if value > MAX_INTERVAL_SECS {
                bail!("{} must be at most {} (one week)", name, MAX_INTERVAL_SECS);
            }
        }
        if self.connect_timeout_secs == 0 || self.request_timeout_secs == 0 {
            bail!("timeouts must be greater than zero");
        }
        if let PayloadShape::Wrapped { ref field } = self.payload {
            if field.is_empty() {
                bail!("payload field name must not be empty");
            }
        }
        for (name, value) in [
            ("key_field", &self.key_field),
            ("from_field", &self.from_field),
            ("to_field", &self.to_field),
        ] {
            if value.is_empty() {
                bail!("{} must not be empty", name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            source_url: "https://example.com/lookup_table.json".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.refresh_interval_secs, 900);
        assert_eq!(config.ttl_secs, 900);
        assert_eq!(config.policy, PolicyKind::Hash);
        assert_eq!(config.payload, PayloadShape::Array);
        assert_eq!(config.key_field, "country");
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());
        assert!(Config::default().validate().is_err());

        let mut config = valid();
        config.source_url = "ftp://example.com/x".to_string();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.refresh_interval_secs = MAX_INTERVAL_SECS;
        assert!(config.validate().is_ok());
        config.refresh_interval_secs = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.ttl_secs = MAX_INTERVAL_SECS + 1;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.payload = PayloadShape::Wrapped {
            field: String::new(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_path_override() {
        let mut config = valid();
        config.cache_file = Some(PathBuf::from("/var/tmp/table.json"));
        assert_eq!(config.cache_path(), PathBuf::from("/var/tmp/table.json"));
    }

    #[test]
    fn test_cache_path_is_stable() {
        let config = valid();
        assert_eq!(config.cache_path(), config.cache_path());
        assert!(config.cache_path().ends_with(CACHE_FILE));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"source_url":"https://example.com/t.json","policy":"expiry","payload":{"kind":"wrapped","field":"lookup"}}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.policy, PolicyKind::Expiry);
        assert_eq!(config.ttl_secs, 900);
        assert_eq!(
            config.payload,
            PayloadShape::Wrapped {
                field: "lookup".to_string()
            }
        );
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = valid();
        config.refresh_interval_secs = 60;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.refresh_interval_secs, 60);
        assert_eq!(loaded.source_url, config.source_url);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert!(config.source_url.is_empty());
    }
}
