//! Configuration types for Arbor
//!
//! Every section deserializes with defaults so a partial TOML file is valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Shared folder-size cache
    #[serde(default)]
    pub cache: CacheConfig,
    /// Tree index behavior
    #[serde(default)]
    pub index: IndexConfig,
    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Shared cache configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Namespace prefix applied by the backend to every key
    #[serde(default = "default_cache_prefix")]
    pub prefix: String,
    /// Eviction window in seconds; entries expire this long after being set
    #[serde(default = "default_eviction_secs")]
    pub eviction_secs: u64,
    /// Maximum number of entries held by the in-memory backend
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl CacheConfig {
    /// Eviction window as a duration
    #[must_use]
    pub const fn eviction(&self) -> Duration {
        Duration::from_secs(self.eviction_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: default_cache_prefix(),
            eviction_secs: default_eviction_secs(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_cache_prefix() -> String {
    "arbor.folder.size".to_string()
}

const fn default_eviction_secs() -> u64 {
    5 * 60
}

const fn default_max_entries() -> usize {
    100_000
}

/// Tree index configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Capacity of the channel between a listing producer and its consumer
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            stream_buffer: default_stream_buffer(),
        }
    }
}

const fn default_stream_buffer() -> usize {
    64
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cache.prefix, "arbor.folder.size");
        assert_eq!(config.cache.eviction(), Duration::from_secs(300));
        assert_eq!(config.index.stream_buffer, 64);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [cache]
            eviction_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.eviction_secs, 30);
        assert_eq!(config.cache.prefix, "arbor.folder.size");
        assert_eq!(config.index, IndexConfig::default());
    }
}
