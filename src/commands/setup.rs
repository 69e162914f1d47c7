// src/commands/setup.rs
//! First activation of a freshly provisioned host
//!
//! The provisioning environment (cloud-init and friends) leaves host
//! specific packages in `<config_dir>/setup-packages/` and either a
//! repository URL or the list of packages to activate in
//! `<config_dir>/setup-flags/`.

use super::{load_config, open_install, parse_ids, with_install_lock};
use crate::cli::GlobalArgs;
use anyhow::{Context, Result};
use pkgpanda::{HttpFetcher, Install, LocalCopyFetcher, PackageId, Repository};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{info, warn};

/// Version every setup package must carry
const SETUP_VERSION: &str = "setup";

pub fn cmd_setup(global: &GlobalArgs, repository_url: Option<&str>) -> Result<()> {
    let config = load_config(global)?;
    let repository = config.open_repository()?;
    let install = open_install(&config)?;

    let repository_url = match repository_url {
        Some(url) => Some(url.to_string()),
        None => match &config.repository_url {
            Some(url) => Some(url.clone()),
            None => read_flag(&install, "setup-flags/repository-url")?,
        },
    };

    with_install_lock(install.root(), || {
        add_setup_packages(&install, &repository)?;

        let to_activate = match &repository_url {
            Some(url) => fetch_active_list(url, &repository)?,
            None => {
                let path = install.config_file("setup-flags/active.json")?;
                let contents = fs::read_to_string(&path)
                    .with_context(|| format!("Unable to read {}", path.display()))?;
                let ids: Vec<String> = serde_json::from_str(&contents)
                    .with_context(|| format!("Unable to decode {} as a JSON list", path.display()))?;
                parse_ids(&ids)?
            }
        };

        let packages = repository.load_packages(&to_activate)?;
        install.activate(&repository, &packages)?;
        info!("Activated {} packages", packages.len());

        if config.manage_systemd {
            install.services().daemon_reload()?;
            install.services().start_all(install.systemd_dir())?;
        }
        Ok(())
    })
}

/// Contents of a machine configuration file, trimmed; `None` if absent
fn read_flag(install: &Install, name: &str) -> Result<Option<String>> {
    let path = install.config_file(name)?;
    match fs::read_to_string(&path) {
        Ok(contents) => Ok(Some(contents.trim().to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Unable to read {}", path.display())),
    }
}

/// Copy host specific packages into the repository
///
/// Packages already in the repository are left as they are.
fn add_setup_packages(install: &Install, repository: &Repository) -> Result<()> {
    let setup_dir = install.config_file("setup-packages")?;
    let entries = match fs::read_dir(&setup_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("No setup packages in {}", setup_dir.display());
            return Ok(());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Unable to read {}", setup_dir.display()));
        }
    };

    let mut ids = Vec::new();
    for entry in entries {
        let name = entry?.file_name().to_string_lossy().into_owned();
        ids.push(setup_package_id(&setup_dir, &name)?);
    }
    ids.sort();

    let fetcher = LocalCopyFetcher::new(&setup_dir);
    for id in &ids {
        if !repository.add(&fetcher, id, false)? {
            warn!("Ignoring already installed package {}", id);
        }
    }
    Ok(())
}

fn setup_package_id(setup_dir: &Path, name: &str) -> Result<PackageId> {
    let id = PackageId::parse(name)
        .with_context(|| format!("Invalid package id in setup package: {}", name))?;
    if id.version() != SETUP_VERSION {
        anyhow::bail!(
            "Setup packages (those in `{}`) must have the version {}. Bad package: {}",
            setup_dir.display(),
            SETUP_VERSION,
            name
        );
    }
    Ok(id)
}

/// Read `config/active.json` from the remote repository and fetch every
/// package it lists
fn fetch_active_list(url: &str, repository: &Repository) -> Result<Vec<PackageId>> {
    let fetcher = HttpFetcher::new(url)?;
    let active_url = fetcher
        .base_url()
        .join("config/active.json")
        .with_context(|| format!("Invalid repository URL {}", url))?;

    let ids: Vec<String> = fetcher
        .client()
        .fetch_json(active_url.as_str())
        .with_context(|| format!("Unable to get list of packages to activate from {}", active_url))?;
    let ids = parse_ids(&ids)?;

    for id in &ids {
        repository.add(&fetcher, id, false)?;
    }
    Ok(ids)
}
