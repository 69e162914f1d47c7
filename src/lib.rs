// src/lib.rs

//! Pkgpanda: host-local package management
//!
//! Stores immutable, version-identified packages and atomically switches a
//! host between sets of active packages, surviving a crash at any point of
//! the switch.
//!
//! # Architecture
//!
//! - Packages: `name--version` directories with a `pkginfo.json`
//! - Repository: a directory of packages, populated by pluggable fetchers
//! - Install: stages a complete new generation, then swaps it in with a
//!   durable two-stage marker that recovery can resume
//! - Build: reproducible versions hashed from sources, script, dependencies
//!   and toolchain

pub mod build;
pub mod config;
mod error;
pub mod filesystem;
pub mod hash;
pub mod install;
pub mod package;
pub mod repository;

pub use build::{BuildInfo, BuildOutcome, BuildRunner, DockerRunner, IdentityItem, PackageBuilder};
pub use config::PandaConfig;
pub use error::{Error, Result, ValidationError, ValidationErrors};
pub use install::{
    validate_compatible, Install, InstallConfig, InstallProgress, NoServiceManager,
    RecoveryOutcome, ServiceManager, SwapStage, Systemctl,
};
pub use package::{Package, PackageId, PackageIdError, PackageKind, PkgInfo};
pub use repository::{Fetcher, HttpFetcher, LocalCopyFetcher, Repository, TarballFetcher};
