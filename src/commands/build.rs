// src/commands/build.rs
//! `pkgpanda build`

use super::{load_config, with_install_lock};
use crate::cli::GlobalArgs;
use anyhow::{Context, Result};
use pkgpanda::{BuildOutcome, PackageBuilder, TarballFetcher};
use std::path::Path;

pub fn cmd_build(global: &GlobalArgs, dir: &Path, add: bool) -> Result<()> {
    let config = load_config(global)?;
    let repository = config.open_repository()?;
    let package_dir = std::path::absolute(dir)?;

    let builder = PackageBuilder::new(&package_dir, &repository);
    let outcome = builder
        .build()
        .with_context(|| format!("Failed to build the package in {}", package_dir.display()))?;

    let tarball = match &outcome {
        BuildOutcome::Built { id, tarball } => {
            println!("Built {} at {}", id, tarball.display());
            tarball.clone()
        }
        BuildOutcome::AlreadyBuilt { id } => {
            println!("{} is already built", id);
            builder.tarball_path(id)
        }
    };

    if add {
        let id = outcome.id();
        if !tarball.exists() {
            // Built elsewhere and only present in the repository
            println!("{} is already in the repository", id);
            return Ok(());
        }
        with_install_lock(&config.root, || {
            if repository.add(&TarballFetcher::new(&tarball), id, false)? {
                println!("Added {} to {}", id, repository.path().display());
            }
            Ok(())
        })?;
    }
    Ok(())
}
