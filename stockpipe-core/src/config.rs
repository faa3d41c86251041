//! Pipeline configuration, loaded from TOML by the caller.
//!
//! The core never reads environment variables; the driver loads this file and
//! hands the relevant section to each component.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Extraction batching, retry and window settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractConfig {
    /// Symbols fetched per batch.
    pub batch_size: usize,
    /// Attempts per symbol before giving up.
    pub max_retries: u32,
    /// Backoff base in seconds; attempt `n` waits `retry_delay_secs * 2^n`.
    #[serde(alias = "retry_delay")]
    pub retry_delay_secs: u64,
    /// Length of the extraction window in days.
    pub days_back: u32,
    /// Pause between batches in seconds.
    pub batch_pause_secs: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_retries: 3,
            retry_delay_secs: 5,
            days_back: 1,
            batch_pause_secs: 1,
        }
    }
}

/// Where staged tables are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StagingConfig {
    pub root: PathBuf,
    /// Key prefix under `root`, e.g. `staging/`.
    pub prefix: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            prefix: "staging/".to_string(),
        }
    }
}

/// Complete configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub extract: ExtractConfig,
    pub staging: StagingConfig,
}

impl PipelineConfig {
    /// Load and check a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and check a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extract.batch_size == 0 {
            return Err(ConfigError::Invalid("extract.batch_size must be > 0".into()));
        }
        if self.extract.max_retries == 0 {
            return Err(ConfigError::Invalid("extract.max_retries must be > 0".into()));
        }
        if self.extract.days_back == 0 {
            return Err(ConfigError::Invalid("extract.days_back must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.extract.batch_size, 50);
        assert_eq!(config.extract.max_retries, 3);
        assert_eq!(config.extract.retry_delay_secs, 5);
        assert_eq!(config.staging.prefix, "staging/");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            [extract]
            batch_size = 10
            days_back = 5

            [staging]
            root = "/tmp/stage"
            "#,
        )
        .unwrap();
        assert_eq!(config.extract.batch_size, 10);
        assert_eq!(config.extract.days_back, 5);
        assert_eq!(config.extract.max_retries, 3);
        assert_eq!(config.staging.root, PathBuf::from("/tmp/stage"));
        assert_eq!(config.staging.prefix, "staging/");
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = PipelineConfig::from_toml("[extract]\nbatch_size = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn retry_delay_is_accepted_as_an_alias() {
        let config = PipelineConfig::from_toml("[extract]\nretry_delay = 10\n").unwrap();
        assert_eq!(config.extract.retry_delay_secs, 10);
    }

    #[test]
    fn misspelled_keys_are_rejected() {
        for text in [
            "[extract]\nretry_dealy = 10\n",
            "[staging]\nprefx = \"x/\"\n",
            "[extractt]\nbatch_size = 2\n",
        ] {
            let err = PipelineConfig::from_toml(text).unwrap_err();
            assert!(matches!(err, ConfigError::Parse(_)), "{text}");
        }
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = PipelineConfig::from_toml("[extract\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn toml_roundtrip() {
        let config = PipelineConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(PipelineConfig::from_toml(&text).unwrap(), config);
    }
}
