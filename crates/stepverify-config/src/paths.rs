//! Where verifier config files live.

use crate::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub const PROJECT_FILE: &str = "stepverify.toml";
pub const LOCAL_FILE: &str = "stepverify.local.toml";

/// A config file layer, in increasing precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Layer {
    /// `~/.config/stepverify/config.toml`
    User,
    /// `stepverify.toml`, checked in next to the tests
    Project,
    /// `stepverify.local.toml`, for uncommitted overrides
    Local,
}

/// Resolves config file locations for a project.
#[derive(Debug, Clone)]
pub struct Paths {
    project_dirs: Option<ProjectDirs>,
}

impl Paths {
    /// Paths for the current user.
    pub fn new() -> Self {
        Self {
            project_dirs: ProjectDirs::from("dev", "stepverify", "stepverify"),
        }
    }

    /// Per-user config file, if the user has a home directory.
    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        self.project_dirs
            .as_ref()
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or(ConfigError::NoHomeDirectory)
    }

    /// Candidate files for `project_dir`, lowest precedence first.
    ///
    /// Files are listed whether or not they exist. The user layer is left
    /// out when `include_user` is false or there is no home directory.
    pub fn layers(&self, project_dir: &Path, include_user: bool) -> Vec<(Layer, PathBuf)> {
        let mut layers = Vec::with_capacity(3);
        if include_user {
            if let Ok(user) = self.user_config_file() {
                layers.push((Layer::User, user));
            }
        }
        layers.push((Layer::Project, project_dir.join(PROJECT_FILE)));
        layers.push((Layer::Local, project_dir.join(LOCAL_FILE)));
        layers
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_user_file_under_app_dir() {
        // Not every CI host has a home directory
        if let Ok(file) = Paths::new().user_config_file() {
            assert!(file.to_string_lossy().contains("stepverify"));
            assert!(file.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_layers_in_precedence_order() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let layers = Paths::new().layers(project_dir, false);
        assert_eq!(
            layers,
            vec![
                (Layer::Project, project_dir.join("stepverify.toml")),
                (Layer::Local, project_dir.join("stepverify.local.toml")),
            ]
        );

        let with_user = Paths::new().layers(project_dir, true);
        assert!(with_user.windows(2).all(|pair| pair[0].0 < pair[1].0));
    }
}
