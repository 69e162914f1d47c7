// src/config.rs

//! Tool configuration
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! command-line flags (applied by the binary).

use crate::error::{Error, Result};
use crate::install::InstallConfig;
use crate::repository::Repository;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_ROOT: &str = "/opt/mesosphere";
pub const DEFAULT_CONFIG_DIR: &str = "/etc/mesosphere";
pub const DEFAULT_REPOSITORY: &str = "/opt/mesosphere/packages";

/// Read when no `--config` is given, if it exists
pub const DEFAULT_CONFIG_FILE: &str = "/etc/pkgpanda/pkgpanda.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PandaConfig {
    /// Install root holding the live generation
    pub root: PathBuf,
    /// Machine configuration: roles, setup flags, setup packages
    pub config_dir: PathBuf,
    /// Local package repository
    pub repository: PathBuf,
    /// Remote repository for `fetch` and `setup`
    pub repository_url: Option<String>,
    /// Keep the systemd wants directory inside the root
    pub rooted_systemd: bool,
    /// Stop and start units around activation
    pub manage_systemd: bool,
    /// Wait for systemd jobs to complete
    pub block_systemd: bool,
}

impl Default for PandaConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            repository: PathBuf::from(DEFAULT_REPOSITORY),
            repository_url: None,
            rooted_systemd: false,
            manage_systemd: true,
            block_systemd: true,
        }
    }
}

impl PandaConfig {
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load `path`, or the default file when present, or the defaults
    ///
    /// An explicitly given file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !required && !path.exists() {
            debug!("No configuration file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Unable to read {}: {}", path.display(), e)))?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_toml(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn install_config(&self) -> InstallConfig {
        InstallConfig {
            root: self.root.clone(),
            config_dir: Some(self.config_dir.clone()),
            rooted_systemd: self.rooted_systemd,
            manage_systemd: self.manage_systemd,
            block_systemd: self.block_systemd,
            env_root: None,
        }
    }

    pub fn open_repository(&self) -> Result<Repository> {
        Ok(Repository::new(std::path::absolute(&self.repository)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PandaConfig::default();
        assert_eq!(config.root, Path::new("/opt/mesosphere"));
        assert_eq!(config.repository, Path::new("/opt/mesosphere/packages"));
        assert!(config.manage_systemd);
        assert!(config.block_systemd);
        assert!(!config.rooted_systemd);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = PandaConfig::from_toml(
            r#"
            root = "/srv/panda"
            rooted_systemd = true
            repository_url = "https://downloads.example.com/stable"
            "#,
        )
        .unwrap();
        assert_eq!(config.root, Path::new("/srv/panda"));
        assert!(config.rooted_systemd);
        assert_eq!(config.config_dir, Path::new(DEFAULT_CONFIG_DIR));
        assert_eq!(
            config.repository_url.as_deref(),
            Some("https://downloads.example.com/stable")
        );
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(matches!(
            PandaConfig::from_toml("rooot = \"/x\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let temp = TempDir::new().unwrap();
        assert!(PandaConfig::load(Some(temp.path().join("missing.toml").as_path())).is_err());

        let path = temp.path().join("pkgpanda.toml");
        fs::write(&path, "manage_systemd = false\n").unwrap();
        let config = PandaConfig::load(Some(path.as_path())).unwrap();
        assert!(!config.manage_systemd);
        assert!(!config.install_config().manage_systemd);
    }
}
