//! Verifier defaults: deadlines, virtual-time budgets and queue sizes.
//!
//! Values are merged from, highest precedence first:
//! 1. `STEPVERIFY_*` environment variables
//! 2. `stepverify.local.toml`
//! 3. `stepverify.toml`
//! 4. `~/.config/stepverify/config.toml`
//! 5. Built-in defaults
//!
//! A script that sets its own deadline or initial offset overrides these
//! for that run only.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use loader::DEFAULT_ENV_PREFIX;
pub use paths::{Layer, Paths};

/// Defaults applied to every verification run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    pub verify: VerifyConfig,
    pub virtual_time: VirtualTimeConfig,
    pub realtime: RealtimeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Deadline applied to real-time runs that do not set their own.
    pub default_timeout_ms: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualTimeConfig {
    /// Clock advances allowed before a run is declared exhausted.
    pub max_advances: u64,
    pub initial_offset_ms: u64,
}

impl Default for VirtualTimeConfig {
    fn default() -> Self {
        Self {
            max_advances: 1_000_000,
            initial_offset_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Capacity of the bounded queue between producer and verifier.
    pub queue_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
        }
    }
}

impl VerifierConfig {
    /// Loads from the current directory and the user's config.
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Parse a single TOML file without layering.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.verify.default_timeout_ms)
    }

    pub fn initial_offset(&self) -> Duration {
        Duration::from_millis(self.virtual_time.initial_offset_ms)
    }

    /// Rejects values that would make every verification fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = [
            ("verify.default_timeout_ms", self.verify.default_timeout_ms == 0),
            ("virtual_time.max_advances", self.virtual_time.max_advances == 0),
            ("realtime.queue_capacity", self.realtime.queue_capacity == 0),
        ];
        match zero.into_iter().find(|(_, is_zero)| *is_zero) {
            Some((field, _)) => Err(ConfigError::Invalid {
                field,
                reason: "must be positive",
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = VerifierConfig::default();
        assert_eq!(config.default_timeout(), Duration::from_secs(30));
        assert_eq!(config.virtual_time.max_advances, 1_000_000);
        assert_eq!(config.initial_offset(), Duration::ZERO);
        assert_eq!(config.realtime.queue_capacity, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let mut config = VerifierConfig::default();
        config.realtime.queue_capacity = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("queue_capacity"));
    }

    #[test]
    fn test_validation_rejects_zero_budget() {
        let mut config = VerifierConfig::default();
        config.virtual_time.max_advances = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "virtual_time.max_advances",
                ..
            })
        ));
    }

    #[test]
    fn test_from_file_partial_sections() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("stepverify.toml");
        std::fs::write(&path, "[verify]\ndefault_timeout_ms = 1500\n").unwrap();

        let config = VerifierConfig::from_file(&path).expect("Failed to parse config");
        assert_eq!(config.default_timeout(), Duration::from_millis(1500));
        // Untouched sections keep their defaults
        assert_eq!(config.realtime.queue_capacity, 256);
    }

    #[test]
    fn test_from_file_missing() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let err = VerifierConfig::from_file(temp_dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_from_file_malformed() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("stepverify.toml");
        std::fs::write(&path, "[verify\n").unwrap();

        let err = VerifierConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
