//! Layered loading of verifier configuration.

use crate::{Paths, VerifierConfig};
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_ENV_PREFIX: &str = "STEPVERIFY";

/// Merges defaults, config files and environment into a [`VerifierConfig`].
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    include_user_config: bool,
}

impl ConfigLoader {
    /// Loader rooted at the current directory.
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            include_user_config: true,
        }
    }

    /// Looks for project and local files in `dir`.
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Reads environment overrides under `prefix` instead of `STEPVERIFY`.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Ignore the per-user config file.
    pub fn without_user_config(mut self) -> Self {
        self.include_user_config = false;
        self
    }

    /// Merges every source, later layers overriding earlier ones, and
    /// validates the result.
    pub fn load(self) -> Result<VerifierConfig> {
        let mut builder = Config::builder().add_source(
            Config::try_from(&VerifierConfig::default())
                .context("Failed to seed configuration defaults")?,
        );

        let layers = Paths::new().layers(&self.project_dir, self.include_user_config);
        for (_, path) in layers.into_iter().filter(|(_, path)| path.exists()) {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        // STEPVERIFY_VIRTUAL_TIME__MAX_ADVANCES=...
        // Section names contain underscores, so nesting uses a double underscore.
        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let verifier_config: VerifierConfig = builder
            .build()
            .and_then(Config::try_deserialize)
            .context("Failed to merge verifier configuration")?;

        verifier_config
            .validate()
            .context("Verifier configuration failed validation")?;

        Ok(verifier_config)
    }

    /// Like [`ConfigLoader::load`], falling back to defaults on any error.
    pub fn load_or_default(self) -> VerifierConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn loader(dir: &Path) -> ConfigLoader {
        // A prefix nobody sets keeps the host environment out of the test
        ConfigLoader::new()
            .with_project_dir(dir)
            .with_env_prefix("STEPVERIFY_LOADER_TEST")
            .without_user_config()
    }

    #[test]
    fn test_no_files_yields_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = loader(temp_dir.path()).load().expect("Failed to load config");

        assert_eq!(config, VerifierConfig::default());
    }

    #[test]
    fn test_project_file_sets_every_section() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("stepverify.toml"),
            r#"
[verify]
default_timeout_ms = 2000

[virtual_time]
max_advances = 10000
initial_offset_ms = 500

[realtime]
queue_capacity = 8
"#,
        )
        .expect("Failed to write config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.default_timeout(), Duration::from_secs(2));
        assert_eq!(config.virtual_time.max_advances, 10_000);
        assert_eq!(config.initial_offset(), Duration::from_millis(500));
        assert_eq!(config.realtime.queue_capacity, 8);
    }

    #[test]
    fn test_local_file_wins_over_project_file() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("stepverify.toml"),
            "[realtime]\nqueue_capacity = 16\n\n[verify]\ndefault_timeout_ms = 700\n",
        )
        .expect("Failed to write project config");
        fs::write(
            project_dir.join("stepverify.local.toml"),
            "[realtime]\nqueue_capacity = 4\n",
        )
        .expect("Failed to write local config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.realtime.queue_capacity, 4);
        // Keys the local file leaves alone still come from the project file
        assert_eq!(config.verify.default_timeout_ms, 700);
    }

    #[test]
    fn test_zero_budget_fails_load() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("stepverify.toml"),
            "[virtual_time]\nmax_advances = 0\n",
        )
        .expect("Failed to write config");

        let err = loader(project_dir).load().unwrap_err();
        assert!(format!("{err:#}").contains("virtual_time.max_advances"));
        assert_eq!(
            loader(project_dir).load_or_default(),
            VerifierConfig::default()
        );
    }
}
