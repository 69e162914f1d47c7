// src/commands/activate.rs
//! Activation and crash recovery

use super::{load_config, open_install, parse_ids, with_install_lock};
use crate::cli::GlobalArgs;
use anyhow::{Context, Result};
use pkgpanda::RecoveryOutcome;
use tracing::info;

/// Make exactly `ids` the active set
pub fn cmd_activate(global: &GlobalArgs, ids: &[String]) -> Result<()> {
    let config = load_config(global)?;
    let ids = parse_ids(ids)?;
    let repository = config.open_repository()?;
    let install = open_install(&config)?;

    with_install_lock(install.root(), || {
        let packages = repository
            .load_packages(&ids)
            .context("Failed to load packages to activate")?;
        install.activate(&repository, &packages)?;

        info!("Activated {} packages", packages.len());
        Ok(())
    })
}

/// Finish a swap that was interrupted
pub fn cmd_recover(global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let install = open_install(&config)?;

    with_install_lock(install.root(), || {
        match install.recover_swap_active()? {
            RecoveryOutcome::NothingToRecover { marker } => {
                println!(
                    "No recovery performed: no swap in progress ({} does not exist)",
                    marker.display()
                );
            }
            RecoveryOutcome::Recovered { stage, extension } => {
                println!("Recovered swap of '{}' from stage {}", extension, stage);
            }
        }
        Ok(())
    })
}
