// src/install/swap.rs

//! Crash-recoverable generation swap
//!
//! The swap has two durable stages recorded in `install_progress`:
//!
//! - `archive`: units are being stopped and live paths renamed to `.old`
//! - `move_new`: staged paths are being renamed over the live names
//!
//! The marker is written before the first live path is touched and removed
//! only after the new generation is fully in place, so its presence after a
//! restart names exactly the suffix being promoted and where to resume.
//! Every step checks what is already done, so recovery can itself be
//! interrupted and rerun.

use super::systemd::unit_names;
use super::{with_suffix, Install, OLD_SUFFIX};
use crate::error::{Error, Result};
use crate::filesystem::{exists_nofollow, publish_json, remove_path, rename_if_exists, sync_parent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Stage of an in-flight swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStage {
    Archive,
    MoveNew,
}

impl fmt::Display for SwapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archive => f.write_str("archive"),
            Self::MoveNew => f.write_str("move_new"),
        }
    }
}

/// Contents of the `install_progress` marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallProgress {
    pub stage: SwapStage,
    pub extension: String,
}

/// Result of [`Install::recover_swap_active`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// No swap was in flight
    NothingToRecover { marker: PathBuf },
    /// An interrupted swap was completed
    Recovered { stage: SwapStage, extension: String },
}

impl Install {
    /// Promote the generation with suffix `extension` to live
    ///
    /// With `archive`, running units are stopped and the live generation is
    /// kept as `.old`; without it the live paths must already be gone.
    pub fn swap_active(&self, extension: &str, archive: bool) -> Result<()> {
        validate_extension(extension)?;

        for name in self.active_names() {
            let staged = with_suffix(&name, extension);
            if !exists_nofollow(&staged) {
                return Err(Error::InvariantViolation(format!(
                    "Unable to swap active packages. Needed file {} doesn't exist",
                    staged.display()
                )));
            }
        }

        let stage = if archive {
            SwapStage::Archive
        } else {
            SwapStage::MoveNew
        };
        self.run_swap(stage, extension)
    }

    /// Finish a swap interrupted by a crash, if there was one
    pub fn recover_swap_active(&self) -> Result<RecoveryOutcome> {
        let marker = self.progress_path();
        let progress = match self.read_progress()? {
            Some(progress) => progress,
            None => {
                info!("No swap in progress ({} does not exist)", marker.display());
                return Ok(RecoveryOutcome::NothingToRecover { marker });
            }
        };
        validate_extension(&progress.extension)?;

        info!(
            "Recovering swap of '{}' from stage {}",
            progress.extension, progress.stage
        );

        for name in self.active_names() {
            let staged = with_suffix(&name, &progress.extension);
            let present = match progress.stage {
                // Nothing staged has moved yet during archive
                SwapStage::Archive => exists_nofollow(&staged),
                SwapStage::MoveNew => exists_nofollow(&staged) || exists_nofollow(&name),
            };
            if !present {
                return Err(Error::InvariantViolation(format!(
                    "Cannot recover swap at stage {}: neither {} nor a promoted {} exists",
                    progress.stage,
                    staged.display(),
                    name.display()
                )));
            }
        }

        self.run_swap(progress.stage, &progress.extension)?;
        Ok(RecoveryOutcome::Recovered {
            stage: progress.stage,
            extension: progress.extension,
        })
    }

    /// Read the marker; `None` when no swap is in flight
    pub fn read_progress(&self) -> Result<Option<InstallProgress>> {
        let marker = self.progress_path();
        let contents = match fs::read_to_string(&marker) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&contents).map(Some).map_err(|e| {
            Error::InvariantViolation(format!(
                "Unreadable install progress marker {}: {}",
                marker.display(),
                e
            ))
        })
    }

    fn record_progress(&self, stage: SwapStage, extension: &str) -> Result<()> {
        let marker = self.progress_path();
        publish_json(
            &with_suffix(&marker, ".tmp"),
            &marker,
            &InstallProgress {
                stage,
                extension: extension.to_string(),
            },
        )?;
        debug!("Recorded swap stage {} for '{}'", stage, extension);
        Ok(())
    }

    fn run_swap(&self, stage: SwapStage, extension: &str) -> Result<()> {
        if stage == SwapStage::Archive {
            self.record_progress(SwapStage::Archive, extension)?;
            self.archive_live()?;
        }

        self.record_progress(SwapStage::MoveNew, extension)?;
        self.promote(extension)?;
        self.link_units()?;

        let marker = self.progress_path();
        remove_path(&marker)?;
        sync_parent(&marker)?;

        info!("Swap of '{}' complete", extension);
        Ok(())
    }

    /// Stop units, drop their flattened links and move live paths to `.old`
    fn archive_live(&self) -> Result<()> {
        if let Some(wants) = self.current_wants_dir() {
            self.services.stop_all(&wants)?;
            self.unlink_units(&wants)?;
        }

        for name in self.active_names() {
            let old = with_suffix(&name, OLD_SUFFIX);
            if !exists_nofollow(&name) {
                // First activation, or archived before an interruption
                continue;
            }
            // A live path means this one was not archived yet; any .old
            // beside it is a leftover and not part of this swap
            remove_path(&old)?;
            fs::rename(&name, &old)?;
            debug!("Archived {}", name.display());
        }
        for name in self.active_names() {
            sync_parent(&name)?;
        }

        info!("Archived previous generation");
        Ok(())
    }

    /// Rename every staged path over its live name
    fn promote(&self, extension: &str) -> Result<()> {
        for name in self.active_names() {
            let staged = with_suffix(&name, extension);
            if rename_if_exists(&staged, &name)? {
                debug!("Promoted {}", staged.display());
            } else if exists_nofollow(&name) {
                debug!("{} already promoted", name.display());
            } else {
                return Err(Error::InvariantViolation(format!(
                    "Cannot promote {}: neither it nor {} exists",
                    name.display(),
                    staged.display()
                )));
            }
        }
        for name in self.active_names() {
            sync_parent(&name)?;
        }

        info!("New generation is live");
        Ok(())
    }

    /// The live wants directory, or its archive if the live one is gone
    fn current_wants_dir(&self) -> Option<PathBuf> {
        let old = with_suffix(&self.systemd_dir, OLD_SUFFIX);
        if self.systemd_dir.is_dir() {
            Some(self.systemd_dir.clone())
        } else if old.is_dir() {
            Some(old)
        } else {
            None
        }
    }

    /// Directory flattened unit links live in
    fn unit_link_dir(&self) -> Result<&Path> {
        self.systemd_dir.parent().ok_or_else(|| {
            Error::InvariantViolation(format!(
                "Systemd directory {} has no parent",
                self.systemd_dir.display()
            ))
        })
    }

    fn unlink_units(&self, wants: &Path) -> Result<()> {
        let link_dir = self.unit_link_dir()?;
        for unit in unit_names(wants)? {
            match fs::remove_file(link_dir.join(&unit)) {
                Ok(()) => debug!("Removed unit link {}", unit),
                // Upgrading from a layout without flattened links
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Link every unit of the live wants directory next to it
    ///
    /// Units must be both in the wants directory and in the systemd
    /// directory proper to stay loaded.
    fn link_units(&self) -> Result<()> {
        let link_dir = self.unit_link_dir()?;
        for unit in unit_names(&self.systemd_dir)? {
            let wanted = self.systemd_dir.join(&unit);
            let target = fs::canonicalize(&wanted).unwrap_or_else(|e| {
                warn!("Unable to resolve {}: {}", wanted.display(), e);
                wanted.clone()
            });
            let link = link_dir.join(&unit);
            remove_path(&link)?;
            symlink(&target, &link)?;
            debug!("Linked unit {} -> {}", link.display(), target.display());
        }
        Ok(())
    }
}

fn validate_extension(extension: &str) -> Result<()> {
    if extension.len() > 1 && extension.starts_with('.') && !extension.contains('/') {
        Ok(())
    } else {
        Err(Error::InvariantViolation(format!(
            "Invalid generation suffix '{extension}'"
        )))
    }
}
