//! Store configuration
//!
//! Loaded from a JSON file; every field is optional and falls back to its
//! default.
//!
//! ```json
//! {
//!   "default_lock_timeout_ms": 4000,
//!   "differential_versions_per_key": 2,
//!   "checkpoint_lock_timeout_ms": 30000,
//!   "checkpoint_differential_threshold": 10000,
//!   "log_level": "info"
//! }
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::checkpoint::CheckpointPolicy;
use crate::lock::Timeout;
use crate::observability::Severity;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Tunables of one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Lock wait used by callers that do not pass their own timeout
    #[serde(default = "default_lock_timeout_ms")]
    pub default_lock_timeout_ms: u64,

    /// Versions kept per key in the differential tier (>= 1)
    #[serde(default = "default_differential_versions_per_key")]
    pub differential_versions_per_key: usize,

    /// Lock wait per key during checkpoint
    #[serde(default = "default_checkpoint_lock_timeout_ms")]
    pub checkpoint_lock_timeout_ms: u64,

    /// Differential versions that make a checkpoint due; 0 disables
    #[serde(default = "default_checkpoint_differential_threshold")]
    pub checkpoint_differential_threshold: usize,

    /// Minimum log severity: trace, info, warn, error or fatal
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_lock_timeout_ms() -> u64 {
    4_000
}
fn default_differential_versions_per_key() -> usize {
    2
}
fn default_checkpoint_lock_timeout_ms() -> u64 {
    30_000
}
fn default_checkpoint_differential_threshold() -> usize {
    10_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_lock_timeout_ms: default_lock_timeout_ms(),
            differential_versions_per_key: default_differential_versions_per_key(),
            checkpoint_lock_timeout_ms: default_checkpoint_lock_timeout_ms(),
            checkpoint_differential_threshold: default_checkpoint_differential_threshold(),
            log_level: default_log_level(),
        }
    }
}

impl StoreConfig {
    /// Load and validate configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: StoreConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.differential_versions_per_key == 0 {
            return Err(ConfigError::Invalid(
                "differential_versions_per_key must be >= 1".to_string(),
            ));
        }
        self.severity()?;
        Ok(())
    }

    /// Parsed `log_level`
    pub fn severity(&self) -> Result<Severity, ConfigError> {
        self.log_level.parse().map_err(ConfigError::Invalid)
    }

    pub fn default_lock_timeout(&self) -> Timeout {
        Timeout::After(Duration::from_millis(self.default_lock_timeout_ms))
    }

    pub fn checkpoint_lock_timeout(&self) -> Timeout {
        Timeout::After(Duration::from_millis(self.checkpoint_lock_timeout_ms))
    }

    pub fn checkpoint_policy(&self) -> CheckpointPolicy {
        CheckpointPolicy::new(self.checkpoint_differential_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.default_lock_timeout_ms, 4_000);
        assert_eq!(config.differential_versions_per_key, 2);
        assert_eq!(config.checkpoint_lock_timeout_ms, 30_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = StoreConfig::from_json("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = StoreConfig::from_json(r#"{"differential_versions_per_key": 4}"#).unwrap();
        assert_eq!(config.differential_versions_per_key, 4);
        assert_eq!(config.default_lock_timeout_ms, 4_000);
    }

    #[test]
    fn test_zero_depth_is_rejected() {
        let err = StoreConfig::from_json(r#"{"differential_versions_per_key": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_unknown_log_level_is_rejected() {
        assert!(StoreConfig::from_json(r#"{"log_level": "chatty"}"#).is_err());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            StoreConfig::from_json("{"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tierkv.json");
        fs::write(&path, r#"{"checkpoint_lock_timeout_ms": 100, "log_level": "warn"}"#).unwrap();

        let config = StoreConfig::load(&path).unwrap();
        assert_eq!(config.checkpoint_lock_timeout(), Timeout::from_millis(100));
        assert_eq!(config.severity().unwrap(), Severity::Warn);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = StoreConfig::load(&temp_dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
