use crate::error::{Result, ScannerError};
use serde::Deserialize;
use std::fs;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub playtomic: PlaytomicConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// SQLite file backing the persistent availability cache.
    pub database_path: String,
    pub memory_max_entries: usize,
    pub memory_ttl_secs: u64,
    pub persistent_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub cities: Vec<String>,
    pub days_ahead: u32,
    pub max_concurrent_tasks: usize,
    pub task_timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaytomicConfig {
    pub requests_per_second: u32,
    pub request_timeout_secs: u64,
    pub venue_batch_size: usize,
    pub batch_delay_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            database_path: "playscanner.db".to_string(),
            memory_max_entries: 500,
            memory_ttl_secs: crate::constants::MEMORY_CACHE_TTL_SECS,
            persistent_ttl_secs: crate::constants::PERSISTENT_CACHE_TTL_SECS,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            cities: crate::constants::DEFAULT_COLLECTOR_CITIES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            days_ahead: 7,
            max_concurrent_tasks: 2,
            max_retries: 3,
            task_timeout_secs: crate::constants::COLLECTOR_TASK_TIMEOUT_SECS,
        }
    }
}

impl Default for PlaytomicConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2,
            request_timeout_secs: 30,
            venue_batch_size: 3,
            batch_delay_ms: 500,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = "config.toml";
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            ScannerError::Config(format!("Failed to read config file '{}': {}", config_path, e))
        })?;

        let mut config: Config = toml::from_str(&config_content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults for when no config.toml is present (tests, one-off CLI use).
    /// A file that exists but fails to parse is reported, not silently
    /// replaced, so typos in it are visible.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(cfg) => cfg,
            Err(e) => {
                if matches!(e, ScannerError::Toml(_)) {
                    warn!("config.toml is invalid, falling back to defaults: {}", e);
                }
                let mut cfg = Config {
                    cache: CacheConfig::default(),
                    collector: CollectorConfig::default(),
                    playtomic: PlaytomicConfig::default(),
                };
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("PLAYSCANNER_DB_PATH") {
            if !path.trim().is_empty() {
                self.cache.database_path = path;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_section_fills_missing_fields_from_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [cache]
            database_path = "custom.db"

            [collector]
            days_ahead = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.cache.database_path, "custom.db");
        assert_eq!(cfg.cache.memory_max_entries, 500);
        assert_eq!(cfg.collector.days_ahead, 3);
        assert_eq!(cfg.collector.max_retries, 3);
        assert_eq!(cfg.playtomic.requests_per_second, 2);
    }

    #[test]
    fn empty_file_parses_to_full_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.cache.database_path, "playscanner.db");
        assert_eq!(cfg.collector.cities.len(), 5);
    }
}
