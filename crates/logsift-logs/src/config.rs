use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ReaderError, Result};

/// Smallest chunk removed per step of a progressive clear
pub const MIN_PROGRESSIVE_CLEARING_CHUNK_SIZE: usize = 128;

/// Keys of the tunable values in [`ReaderConfig`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    ContinuousUpdateInterval,
    NonContinuousUpdateInterval,
    NonContinuousChunkSize,
    NonContinuousPaddingInterval,
    ProgressiveClearingChunkSize,
    ProgressiveClearingInterval,
    RestartWhenNoLogReadDelay,
    SkippableLineTimeout,
    StringPoolCapacity,
}

/// Tunables shared by all readers
///
/// Every value has a built-in default, so an empty TOML document is a valid
/// configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Debounce interval for continuous reading, in milliseconds
    pub continuous_update_interval_ms: u64,

    /// Longest time logs are batched while reading non-continuously
    pub non_continuous_update_interval_ms: u64,

    /// Largest batch delivered while reading non-continuously
    pub non_continuous_chunk_size: usize,

    /// Pause before each non-continuous batch is delivered
    pub non_continuous_padding_interval_ms: u64,

    pub progressive_clearing_chunk_size: usize,

    pub progressive_clearing_interval_ms: u64,

    /// Restart delay used when a continuous pass produced no logs
    pub restart_when_no_log_read_delay_ms: u64,

    /// How long a skippable pattern waits for the next line
    pub skippable_line_timeout_ms: u64,

    pub string_pool_capacity: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            continuous_update_interval_ms: 100,
            non_continuous_update_interval_ms: 2000,
            non_continuous_chunk_size: 32768,
            non_continuous_padding_interval_ms: 50,
            progressive_clearing_chunk_size: 8192,
            progressive_clearing_interval_ms: 60,
            restart_when_no_log_read_delay_ms: 2000,
            skippable_line_timeout_ms: 5000,
            string_pool_capacity: 4096,
        }
    }
}

impl ReaderConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ReaderError::Config(e.to_string()))
    }

    /// Load a configuration file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ReaderError::Config(format!("{}: {}", path.display(), e))),
        }
    }

    /// Look a tunable up by key
    pub fn get(&self, key: ConfigKey) -> u64 {
        match key {
            ConfigKey::ContinuousUpdateInterval => self.continuous_update_interval_ms,
            ConfigKey::NonContinuousUpdateInterval => self.non_continuous_update_interval_ms,
            ConfigKey::NonContinuousChunkSize => self.non_continuous_chunk_size as u64,
            ConfigKey::NonContinuousPaddingInterval => self.non_continuous_padding_interval_ms,
            ConfigKey::ProgressiveClearingChunkSize => self.progressive_clearing_chunk_size as u64,
            ConfigKey::ProgressiveClearingInterval => self.progressive_clearing_interval_ms,
            ConfigKey::RestartWhenNoLogReadDelay => self.restart_when_no_log_read_delay_ms,
            ConfigKey::SkippableLineTimeout => self.skippable_line_timeout_ms,
            ConfigKey::StringPoolCapacity => self.string_pool_capacity as u64,
        }
    }

    pub(crate) fn millis(&self, key: ConfigKey) -> Duration {
        Duration::from_millis(self.get(key))
    }

    pub(crate) fn clearing_chunk_size(&self) -> usize {
        self.progressive_clearing_chunk_size
            .max(MIN_PROGRESSIVE_CLEARING_CHUNK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = ReaderConfig::from_toml_str("").unwrap();
        assert_eq!(config, ReaderConfig::default());
        assert_eq!(config.get(ConfigKey::NonContinuousChunkSize), 32768);
    }

    #[test]
    fn test_partial_toml() {
        let config = ReaderConfig::from_toml_str(
            "continuous_update_interval_ms = 10\nprogressive_clearing_chunk_size = 3\n",
        )
        .unwrap();
        assert_eq!(config.get(ConfigKey::ContinuousUpdateInterval), 10);
        assert_eq!(config.get(ConfigKey::RestartWhenNoLogReadDelay), 2000);
        assert_eq!(config.clearing_chunk_size(), MIN_PROGRESSIVE_CLEARING_CHUNK_SIZE);
    }

    #[test]
    fn test_invalid_toml() {
        let err = ReaderConfig::from_toml_str("string_pool_capacity = \"big\"").unwrap_err();
        assert!(matches!(err, ReaderError::Config(_)));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("logsift-config-that-does-not-exist.toml");
        assert_eq!(ReaderConfig::load(&path).unwrap(), ReaderConfig::default());
    }
}
