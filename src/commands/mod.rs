// src/commands/mod.rs
//! Command handlers for the pkgpanda CLI

mod activate;
mod bootstrap;
mod build;
mod packages;
mod setup;

pub use activate::{cmd_activate, cmd_recover};
pub use bootstrap::cmd_bootstrap;
pub use build::cmd_build;
pub use packages::{cmd_active, cmd_add, cmd_fetch, cmd_list, cmd_remove};
pub use setup::cmd_setup;

use crate::cli::GlobalArgs;
use anyhow::{Context, Result};
use fs2::FileExt;
use pkgpanda::{Install, PackageId, PandaConfig};
use std::fs::{self, OpenOptions};
use std::path::Path;
use tracing::debug;

/// Advisory lock file serializing host mutations, relative to the root
const LOCK_FILE: &str = ".pkgpanda.lock";

/// Configuration file values with command-line overrides applied
pub(crate) fn load_config(global: &GlobalArgs) -> Result<PandaConfig> {
    let mut config = PandaConfig::load(global.config.as_deref())?;

    if let Some(root) = &global.root {
        config.root = root.clone();
    }
    if let Some(config_dir) = &global.config_dir {
        config.config_dir = config_dir.clone();
    }
    if let Some(repository) = &global.repository {
        config.repository = repository.clone();
    }
    if global.rooted_systemd {
        config.rooted_systemd = true;
    }
    if global.no_systemd {
        config.manage_systemd = false;
    }
    if global.no_block_systemd {
        config.block_systemd = false;
    }

    debug!("Effective configuration: {:?}", config);
    Ok(config)
}

pub(crate) fn open_install(config: &PandaConfig) -> Result<Install> {
    Install::new(config.install_config())
        .with_context(|| format!("Failed to open install at {}", config.root.display()))
}

pub(crate) fn parse_ids(ids: &[String]) -> Result<Vec<PackageId>> {
    ids.iter()
        .map(|id| PackageId::parse(id).with_context(|| format!("Invalid package id '{}'", id)))
        .collect()
}

/// Run `f` holding the exclusive host lock for `root`
///
/// Blocks until any other pkgpanda process mutating the same root is done.
/// The lock is released when the lock file is closed.
pub(crate) fn with_install_lock<T>(root: &Path, f: impl FnOnce() -> Result<T>) -> Result<T> {
    fs::create_dir_all(root)
        .with_context(|| format!("Failed to create install root {}", root.display()))?;
    let lock_path = root.join(LOCK_FILE);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;

    if file.try_lock_exclusive().is_err() {
        eprintln!("Waiting for another pkgpanda process to release {}", lock_path.display());
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock {}", lock_path.display()))?;
    }
    debug!("Holding {}", lock_path.display());

    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_flags_override_config() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("pkgpanda.toml");
        fs::write(&config_path, "root = \"/srv/panda\"\nblock_systemd = true\n").unwrap();

        let global = GlobalArgs {
            config: Some(config_path),
            repository: Some(PathBuf::from("/srv/repo")),
            no_block_systemd: true,
            ..GlobalArgs::default()
        };
        let config = load_config(&global).unwrap();

        assert_eq!(config.root, Path::new("/srv/panda"));
        assert_eq!(config.repository, Path::new("/srv/repo"));
        assert!(!config.block_systemd);
        assert!(config.manage_systemd);
    }

    #[test]
    fn test_lock_is_reentrant_across_calls() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");

        let first = with_install_lock(&root, || Ok(1)).unwrap();
        let second = with_install_lock(&root, || Ok(2)).unwrap();

        assert_eq!(first + second, 3);
        assert!(root.join(LOCK_FILE).exists());
    }

    #[test]
    fn test_parse_ids_reports_bad_id() {
        let ids = vec!["mesos--0.22.0".to_string(), "mesos".to_string()];
        let err = parse_ids(&ids).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid package id 'mesos'"));
    }
}
