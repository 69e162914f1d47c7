// src/commands/packages.rs
//! Repository commands: list, active, fetch, add, remove

use super::{load_config, open_install, parse_ids, with_install_lock};
use crate::cli::GlobalArgs;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use pkgpanda::{HttpFetcher, PackageId, TarballFetcher};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Print the repository, grouping several versions of one name together
pub fn cmd_list(global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let repository = config.open_repository()?;
    let ids = repository
        .list()
        .with_context(|| format!("Failed to list {}", repository.path().display()))?;

    for line in format_listing(ids.iter()) {
        println!("{}", line);
    }
    Ok(())
}

fn format_listing<'a>(ids: impl Iterator<Item = &'a PackageId>) -> Vec<String> {
    let mut by_name: BTreeMap<&str, Vec<&PackageId>> = BTreeMap::new();
    for id in ids {
        by_name.entry(id.name()).or_default().push(id);
    }

    let mut lines = Vec::new();
    for (name, versions) in by_name {
        if let [only] = versions.as_slice() {
            lines.push(only.to_string());
        } else {
            lines.push(format!("{}:", name));
            lines.extend(versions.iter().map(|id| format!("  {}", id.version())));
        }
    }
    lines
}

pub fn cmd_active(global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let install = open_install(&config)?;
    for id in install.active()? {
        println!("{}", id);
    }
    Ok(())
}

fn fetch_spinner(id: &PackageId) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} {bytes}") {
        spinner.set_style(style);
    }
    spinner.set_message(format!("Fetching {}", id));
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Download packages from a remote repository
pub fn cmd_fetch(global: &GlobalArgs, ids: &[String], repository_url: Option<&str>) -> Result<()> {
    let config = load_config(global)?;
    let url = repository_url
        .map(str::to_string)
        .or_else(|| config.repository_url.clone())
        .context("No repository URL given; pass --repository-url or set repository_url")?;
    let ids = parse_ids(ids)?;
    let repository = config.open_repository()?;

    with_install_lock(&config.root, || {
        for id in &ids {
            let spinner = fetch_spinner(id);
            let fetcher = HttpFetcher::new(&url)?.with_progress(spinner.clone());
            let result = repository.add(&fetcher, id, true);
            match result {
                Ok(_) => spinner.finish_with_message(format!("Fetched {}", id)),
                Err(e) => {
                    spinner.abandon_with_message(format!("Unable to fetch {}", id));
                    return Err(e).with_context(|| format!("Unable to fetch package {}", id));
                }
            }
        }
        Ok(())
    })
}

/// Add local package tarballs to the repository
pub fn cmd_add(global: &GlobalArgs, tarballs: &[PathBuf]) -> Result<()> {
    let config = load_config(global)?;
    let repository = config.open_repository()?;

    with_install_lock(&config.root, || {
        for tarball in tarballs {
            let id = TarballFetcher::id_from_filename(tarball)?;
            let added = repository
                .add(&TarballFetcher::new(tarball), &id, true)
                .with_context(|| format!("Failed to add {}", tarball.display()))?;
            if added {
                println!("Added: {}", id);
            }
        }
        Ok(())
    })
}

/// Remove packages that are not active
pub fn cmd_remove(global: &GlobalArgs, ids: &[String]) -> Result<()> {
    let config = load_config(global)?;
    let ids = parse_ids(ids)?;
    let repository = config.open_repository()?;
    let install = open_install(&config)?;

    with_install_lock(&config.root, || {
        let active = install.active()?;
        let refused: Vec<String> = ids
            .iter()
            .map(PackageId::to_string)
            .filter(|id| active.contains(id))
            .collect();
        if !refused.is_empty() {
            anyhow::bail!("Refusing to remove active packages {}", refused.join(" "));
        }

        for id in &ids {
            repository
                .remove(id)
                .with_context(|| format!("Error removing package {}", id))?;
            info!("Removed {}", id);
            println!("Removed: {}", id);
        }
        Ok(())
    })
}
