// src/install/mod.rs

//! Host activation engine
//!
//! An install root holds exactly one live generation: the merged
//! well-known directories, the `active/` directory of per-package symlinks,
//! the environment files and the aggregated build metadata. Activation
//! stages a complete `.new` generation beside the live one, then swaps it in
//! with a two-stage, marker-driven protocol that [`Install::recover_swap_active`]
//! can resume after a crash.
//!
//! The engine holds no lock. Only one activation may run against a root at
//! a time, and the root, the well-known directories and the marker must
//! share one filesystem for renames to be atomic.

mod generation;
mod swap;
mod systemd;
mod validate;

pub use swap::{InstallProgress, RecoveryOutcome, SwapStage};
pub use systemd::{service_name, unit_names, NoServiceManager, ServiceManager, Systemctl};
pub use validate::{validate_compatible, RESERVED_CONTRIBUTOR};

use crate::error::{Error, Result};
use crate::package::Package;
use crate::repository::Repository;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directories every package may contribute to, relative to the root
pub const WELL_KNOWN_DIRS: [&str; 4] = ["bin", "etc", "include", "lib"];

/// Name of the systemd wants directory packages contribute units to
pub const SYSTEMD_WANTS_DIR: &str = "dcos.target.wants";

/// Host systemd directory used unless systemd is rooted in the install
pub const HOST_SYSTEMD_DIR: &str = "/etc/systemd/system";

pub const ACTIVE_DIR: &str = "active";
pub const ENVIRONMENT_FILE: &str = "environment";
pub const ENVIRONMENT_EXPORT_FILE: &str = "environment.export";
pub const ACTIVE_BUILDINFO_FILE: &str = "active.buildinfo.full.json";
pub const PROGRESS_FILE: &str = "install_progress";

/// Suffix of a generation being built
pub const NEW_SUFFIX: &str = ".new";

/// Suffix of the archived previous generation
pub const OLD_SUFFIX: &str = ".old";

/// Variables the install sets itself; packages may not declare them
pub const RESERVED_ENV_VARS: [&str; 2] = ["LD_LIBRARY_PATH", "PATH"];

/// Where an install lives and how it treats services
#[derive(Debug, Clone)]
pub struct InstallConfig {
    pub root: PathBuf,
    /// Machine configuration (`roles/`, `setup-flags/`, `setup-packages/`)
    pub config_dir: Option<PathBuf>,
    /// Use `<root>/dcos.target.wants` instead of the host systemd directory
    pub rooted_systemd: bool,
    /// Stop units before archiving a generation
    pub manage_systemd: bool,
    /// Wait for systemd jobs to finish
    pub block_systemd: bool,
    /// Path written into the environment files in place of `root`
    ///
    /// Bootstrap builds a tree under a scratch root that is later unpacked
    /// at the real location.
    pub env_root: Option<PathBuf>,
}

impl InstallConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config_dir: None,
            rooted_systemd: false,
            manage_systemd: true,
            block_systemd: true,
            env_root: None,
        }
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            config_dir: Some(PathBuf::from(crate::config::DEFAULT_CONFIG_DIR)),
            ..Self::new(crate::config::DEFAULT_ROOT)
        }
    }
}

/// A rooted install tree
pub struct Install {
    root: PathBuf,
    config_dir: Option<PathBuf>,
    roles: Vec<String>,
    systemd_dir: PathBuf,
    env_root: PathBuf,
    services: Box<dyn ServiceManager>,
}

impl std::fmt::Debug for Install {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Install")
            .field("root", &self.root)
            .field("config_dir", &self.config_dir)
            .field("roles", &self.roles)
            .field("systemd_dir", &self.systemd_dir)
            .field("env_root", &self.env_root)
            .finish_non_exhaustive()
    }
}

impl Install {
    /// Open an install root, reading the host roles from `<config_dir>/roles`
    pub fn new(config: InstallConfig) -> Result<Self> {
        let root = std::path::absolute(&config.root)?;
        let config_dir = config
            .config_dir
            .as_deref()
            .map(std::path::absolute)
            .transpose()?;

        let roles = match &config_dir {
            Some(dir) => read_roles(&dir.join("roles"))?,
            None => Vec::new(),
        };

        let systemd_dir = if config.rooted_systemd {
            root.join(SYSTEMD_WANTS_DIR)
        } else {
            Path::new(HOST_SYSTEMD_DIR).join(SYSTEMD_WANTS_DIR)
        };

        let services: Box<dyn ServiceManager> = if config.manage_systemd {
            Box::new(Systemctl::new(config.block_systemd))
        } else {
            Box::new(NoServiceManager)
        };

        let env_root = config.env_root.unwrap_or_else(|| root.clone());

        debug!(
            "Install at {} (roles: [{}], systemd: {})",
            root.display(),
            roles.join(", "),
            systemd_dir.display()
        );

        Ok(Self {
            root,
            config_dir,
            roles,
            systemd_dir,
            env_root,
            services,
        })
    }

    /// Replace the service manager
    pub fn with_service_manager(mut self, services: Box<dyn ServiceManager>) -> Self {
        self.services = services;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_dir(&self) -> Option<&Path> {
        self.config_dir.as_deref()
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// The systemd wants directory managed by this install
    pub fn systemd_dir(&self) -> &Path {
        &self.systemd_dir
    }

    pub fn services(&self) -> &dyn ServiceManager {
        self.services.as_ref()
    }

    /// Path of a file in the machine configuration directory
    pub fn config_file(&self, name: &str) -> Result<PathBuf> {
        self.config_dir
            .as_ref()
            .map(|dir| dir.join(name))
            .ok_or_else(|| Error::Config("no machine configuration directory is set".to_string()))
    }

    /// Well-known directories, merged from every package
    pub fn well_known_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = WELL_KNOWN_DIRS.iter().map(|d| self.root.join(d)).collect();
        dirs.push(self.systemd_dir.clone());
        dirs
    }

    /// Every path that makes up one generation
    pub fn active_names(&self) -> Vec<PathBuf> {
        let mut names = self.well_known_dirs();
        for name in [
            ENVIRONMENT_FILE,
            ENVIRONMENT_EXPORT_FILE,
            ACTIVE_DIR,
            ACTIVE_BUILDINFO_FILE,
        ] {
            names.push(self.root.join(name));
        }
        names
    }

    pub fn progress_path(&self) -> PathBuf {
        self.root.join(PROGRESS_FILE)
    }

    /// Ids of the active packages, read from the targets of `active/*`
    ///
    /// Targets are not validated, so a damaged active directory can still be
    /// inspected.
    pub fn active(&self) -> Result<BTreeSet<String>> {
        let active_dir = self.root.join(ACTIVE_DIR);
        let entries = match fs::read_dir(&active_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let new = with_suffix(&active_dir, NEW_SUFFIX);
                let old = with_suffix(&active_dir, OLD_SUFFIX);
                return Err(Error::InstallError(if new.exists() || old.exists() {
                    format!(
                        "Broken past deploy. See {} for what the (potentially incomplete) new state \
                         should be and optionally {} if it exists for the complete previous state",
                        new.display(),
                        old.display()
                    )
                } else {
                    format!(
                        "Install directory {} has no active folder. Has it been bootstrapped?",
                        self.root.display()
                    )
                }));
            }
            Err(e) => return Err(e.into()),
        };

        let mut ids = BTreeSet::new();
        for entry in entries {
            let link = entry?.path();
            let target = fs::canonicalize(&link).or_else(|_| fs::read_link(&link))?;
            if let Some(name) = target.file_name() {
                ids.insert(name.to_string_lossy().into_owned());
            }
        }
        Ok(ids)
    }

    /// Make exactly `packages` the active set
    ///
    /// Validation runs before anything on disk changes. The new generation
    /// is staged under `.new` and swapped in; after a crash from the swap
    /// onwards, [`Install::recover_swap_active`] finishes the job.
    pub fn activate(&self, repository: &Repository, packages: &[Package]) -> Result<()> {
        self.stage(repository, packages)?;
        self.swap_active(NEW_SUFFIX, true)
    }

    /// Validate `packages` and build the `.new` generation without swapping
    ///
    /// The live generation is not touched. [`Install::swap_active`] with
    /// [`NEW_SUFFIX`] makes the staged generation live.
    ///
    /// Refuses to run while a swap is in flight: the `.new` and `.old` paths
    /// it would discard are then part of the generations the marker
    /// describes, and [`Install::recover_swap_active`] must finish first.
    pub fn stage(&self, repository: &Repository, packages: &[Package]) -> Result<()> {
        if let Some(progress) = self.read_progress()? {
            return Err(Error::InvariantViolation(format!(
                "A swap of '{}' is in progress at stage {} ({}); recover it before activating",
                progress.extension,
                progress.stage,
                self.progress_path().display()
            )));
        }

        validate_compatible(packages, &self.roles)?;

        let repo_root = std::path::absolute(repository.path())?;
        let mut rooted = Vec::with_capacity(packages.len());
        for package in packages {
            let path = std::path::absolute(package.path())?;
            if !path.starts_with(&repo_root) {
                return Err(Error::InstallError(format!(
                    "Package {} at {} is not in repository {}",
                    package.id(),
                    path.display(),
                    repo_root.display()
                )));
            }
            // Links in the generation must not depend on the working directory
            rooted.push(Package::new(package.id().clone(), path, package.info().clone()));
        }

        info!("Activating {} packages in {}", packages.len(), self.root.display());
        self.stage_generation(&rooted)
    }
}

/// `path` with `suffix` appended to its final component
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn read_roles(roles_dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(roles_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut roles = Vec::new();
    for entry in entries {
        roles.push(entry?.file_name().to_string_lossy().into_owned());
    }
    roles.sort();
    Ok(roles)
}
