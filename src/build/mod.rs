// src/build/mod.rs

//! Reproducible package builds
//!
//! A package directory holds `buildinfo.json` and a `build` script. The
//! builder resolves every source to a stable id, resolves `requires`
//! against the local repository, and hashes all of it together with the
//! toolchain image id into the package version. Identical inputs always
//! produce the same [`PackageId`], so a build whose tarball or repository
//! entry already exists is skipped.
//!
//! The build script runs in an isolated environment supplied by a
//! [`BuildRunner`]; the default is [`DockerRunner`].

mod identity;
mod info;
mod sources;

pub use identity::IdentityItem;
pub use info::{BuildInfo, DEFAULT_DOCKER_IMAGE};
pub use sources::{url_filename, Source, SourceId};

use crate::error::{Error, Result};
use crate::filesystem::remove_path;
use crate::hash::hash_file;
use crate::package::{PackageId, PkgInfo, BUILDINFO_FILE, PKGINFO_FILE};
use crate::repository::{create_tarball, Repository};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

/// Where a package's files live inside the build environment
pub const PACKAGES_MOUNT: &str = "/opt/mesosphere/packages";

/// Everything a runner needs to execute one build script
#[derive(Debug, Clone)]
pub struct BuildJob {
    pub id: PackageId,
    pub image: String,
    pub src_dir: PathBuf,
    pub build_script: PathBuf,
    pub result_dir: PathBuf,
    /// Resolved dependencies and their repository directories
    pub dependencies: Vec<(PackageId, PathBuf)>,
}

impl BuildJob {
    /// Path of the package inside the build environment
    pub fn install_path(&self) -> String {
        format!("{}/{}", PACKAGES_MOUNT, self.id)
    }
}

/// Runs a build script in isolation
pub trait BuildRunner {
    /// Stable identifier of the toolchain image, part of the build identity
    fn toolchain_id(&self, image: &str) -> Result<String>;

    fn run(&self, job: &BuildJob) -> Result<()>;
}

/// Builds inside `docker run`
#[derive(Debug, Clone, Default)]
pub struct DockerRunner;

impl DockerRunner {
    fn docker() -> Result<PathBuf> {
        which::which("docker").map_err(|e| Error::NotFound(format!("docker not found in PATH: {e}")))
    }

    /// Arguments to `docker` for a job
    pub fn run_args(job: &BuildJob) -> Vec<String> {
        let mut args = vec!["run".to_string()];
        let mut volume = |host: &Path, container: String, mode: &str| {
            args.push("-v".to_string());
            args.push(format!("{}:{}:{}", host.display(), container, mode));
        };
        volume(&job.src_dir, "/pkg/src".to_string(), "rw");
        volume(&job.build_script, "/pkg/build".to_string(), "ro");
        volume(&job.result_dir, job.install_path(), "rw");
        for (id, path) in &job.dependencies {
            volume(path, format!("{PACKAGES_MOUNT}/{id}"), "ro");
        }

        for (key, value) in [
            ("PKG_VERSION", job.id.version().to_string()),
            ("PKG_NAME", job.id.name().to_string()),
            ("PKG_ID", job.id.to_string()),
            ("PKG_PATH", job.install_path()),
        ] {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }

        args.push(job.image.clone());
        args.extend(["/bin/bash", "-e", "/pkg/build"].map(String::from));
        args
    }

    fn inspect(image: &str) -> Result<Option<String>> {
        let output = Command::new(Self::docker()?)
            .args(["inspect", "--format", "{{.Id}}", image])
            .output()
            .map_err(|e| Error::IoError(format!("Failed to run docker inspect: {e}")))?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }
}

impl BuildRunner for DockerRunner {
    fn toolchain_id(&self, image: &str) -> Result<String> {
        if let Some(id) = Self::inspect(image)? {
            return Ok(id);
        }

        info!("Pulling {}", image);
        let status = Command::new(Self::docker()?)
            .args(["pull", image])
            .status()
            .map_err(|e| Error::IoError(format!("Failed to run docker pull: {e}")))?;
        if !status.success() {
            return Err(Error::CommandFailed {
                command: format!("docker pull {image}"),
                code: status.code(),
                stderr: String::new(),
            });
        }

        Self::inspect(image)?
            .ok_or_else(|| Error::Build(format!("Unable to determine the id of image {image}")))
    }

    fn run(&self, job: &BuildJob) -> Result<()> {
        let args = Self::run_args(job);
        info!("Building {} in {}", job.id, job.image);
        let status = Command::new(Self::docker()?)
            .args(&args)
            .status()
            .map_err(|e| Error::IoError(format!("Failed to run docker: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::CommandFailed {
                command: format!("docker {}", args.join(" ")),
                code: status.code(),
                stderr: String::new(),
            })
        }
    }
}

/// What [`PackageBuilder::build`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Built { id: PackageId, tarball: PathBuf },
    /// The same inputs were built before
    AlreadyBuilt { id: PackageId },
}

impl BuildOutcome {
    pub fn id(&self) -> &PackageId {
        match self {
            Self::Built { id, .. } | Self::AlreadyBuilt { id } => id,
        }
    }
}

/// Inputs resolved before anything is checked out
#[derive(Debug, Clone)]
pub struct ResolvedBuild {
    pub id: PackageId,
    pub info: BuildInfo,
    pub sources: BTreeMap<String, (Source, SourceId)>,
    pub dependencies: Vec<(PackageId, PathBuf)>,
    pub identity: IdentityItem,
}

/// Builds the package described by one directory
pub struct PackageBuilder<'a> {
    package_dir: PathBuf,
    repository: &'a Repository,
    runner: Box<dyn BuildRunner>,
}

impl<'a> PackageBuilder<'a> {
    pub fn new(package_dir: impl Into<PathBuf>, repository: &'a Repository) -> Self {
        Self {
            package_dir: package_dir.into(),
            repository,
            runner: Box::new(DockerRunner),
        }
    }

    pub fn with_runner(mut self, runner: Box<dyn BuildRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn tarball_path(&self, id: &PackageId) -> PathBuf {
        self.package_dir.join(format!("{id}.tar.xz"))
    }

    /// Resolve sources and dependencies and compute the package id
    pub fn resolve(&self) -> Result<ResolvedBuild> {
        let buildinfo_path = self.package_dir.join("buildinfo.json");
        let build_script = self.package_dir.join("build");
        let info = BuildInfo::load(&buildinfo_path)?;
        let declared_sources = info.all_sources()?;

        // Missing dependencies abort before any source is fetched
        let dependencies = self.resolve_requires(&info)?;

        let mut sources = BTreeMap::new();
        for (name, source) in declared_sources {
            let id = source.resolve(&name, &self.package_dir)?;
            sources.insert(name, (source, id));
        }

        let toolchain = self.runner.toolchain_id(info.docker_image())?;
        if info.docker.is_some() {
            warn!("Specifying a docker image explicitly should be avoided");
        }

        let build_hash = hash_file(&build_script).map_err(|e| {
            Error::Build(format!("Unable to read build script {}: {}", build_script.display(), e))
        })?;

        let source_ids: BTreeMap<String, IdentityItem> = sources
            .iter()
            .map(|(name, (_, id))| (name.clone(), IdentityItem::from(id.clone())))
            .collect();
        let identity = IdentityItem::Map(BTreeMap::from([
            ("sources".to_string(), IdentityItem::Map(source_ids)),
            ("build".to_string(), IdentityItem::Str(build_hash)),
            ("buildinfo".to_string(), IdentityItem::Str(hash_file(&buildinfo_path)?)),
            (
                "requires".to_string(),
                IdentityItem::from(
                    dependencies
                        .iter()
                        .map(|(id, _)| id.to_string())
                        .collect::<Vec<_>>(),
                ),
            ),
            ("docker".to_string(), IdentityItem::Str(toolchain)),
            (
                "environment".to_string(),
                IdentityItem::from(info.environment.clone()),
            ),
        ]));

        let hash = identity.hash();
        let version = match &info.version_extra {
            Some(extra) => format!("{extra}.{hash}"),
            None => hash,
        };
        let id = PackageId::from_parts(&info.name, &version)?;

        Ok(ResolvedBuild {
            id,
            info,
            sources,
            dependencies,
            identity,
        })
    }

    fn resolve_requires(&self, info: &BuildInfo) -> Result<Vec<(PackageId, PathBuf)>> {
        let mut resolved = Vec::new();
        for requirement in &info.requires {
            let id = if PackageId::is_id(requirement) {
                let id = PackageId::parse(requirement)?;
                if !self.repository.has_package(&id)? {
                    return Err(missing(info, requirement));
                }
                id
            } else {
                let candidates = self.repository.ids_for_name(requirement)?;
                let mut candidates = candidates.into_iter();
                match (candidates.next(), candidates.next()) {
                    (Some(id), None) => id,
                    (None, _) => return Err(missing(info, requirement)),
                    (Some(_), Some(_)) => {
                        return Err(Error::Build(format!(
                            "Requirement {} of {} matches several built versions; require a full id",
                            requirement, info.name
                        )));
                    }
                }
            };
            let path = self.repository.package_path(&id);
            resolved.push((id, path));
        }
        resolved.sort();
        resolved.dedup();
        Ok(resolved)
    }

    /// Build the package unless an identical build already exists
    pub fn build(&self) -> Result<BuildOutcome> {
        let resolved = self.resolve()?;
        let id = resolved.id.clone();
        let tarball = self.tarball_path(&id);

        if tarball.exists() || self.repository.has_package(&id)? {
            info!("Package {} is already built", id);
            return Ok(BuildOutcome::AlreadyBuilt { id });
        }

        let src_dir = self.package_dir.join("src");
        let result_dir = self.package_dir.join("result");
        remove_path(&src_dir)?;
        remove_path(&result_dir)?;
        fs::create_dir_all(&src_dir)?;
        fs::create_dir_all(&result_dir)?;

        info!("Checking out sources for {}", id);
        for (name, (source, source_id)) in &resolved.sources {
            source.checkout_to(name, &self.package_dir, source_id, &src_dir.join(name))?;
        }

        self.write_metadata(&resolved, &result_dir)?;

        let job = BuildJob {
            id: id.clone(),
            image: resolved.info.docker_image().to_string(),
            src_dir: std::path::absolute(&src_dir)?,
            build_script: std::path::absolute(self.package_dir.join("build"))?,
            result_dir: std::path::absolute(&result_dir)?,
            dependencies: resolved.dependencies.clone(),
        };
        self.runner.run(&job)?;

        create_tarball(&result_dir, &tarball)?;
        info!("Package built, available at {}", tarball.display());
        Ok(BuildOutcome::Built { id, tarball })
    }

    fn write_metadata(&self, resolved: &ResolvedBuild, result_dir: &Path) -> Result<()> {
        let pkginfo = PkgInfo {
            requires: resolved.info.requires.iter().cloned().collect(),
            environment: resolved.info.environment.clone(),
            ..PkgInfo::default()
        };
        fs::write(result_dir.join(PKGINFO_FILE), pkginfo.to_json_pretty()?)?;

        fs::copy(
            self.package_dir.join("buildinfo.json"),
            result_dir.join("buildinfo.json"),
        )?;

        let source_ids: BTreeMap<&String, &SourceId> = resolved
            .sources
            .iter()
            .map(|(name, (_, id))| (name, id))
            .collect();
        fs::write(
            result_dir.join("build_ids.json"),
            serde_json::to_vec_pretty(&source_ids)?,
        )?;

        let full = serde_json::json!({
            "package_id": resolved.id,
            "buildinfo": resolved.info,
            "build_ids": resolved.identity.to_json(),
            "dependencies": resolved
                .dependencies
                .iter()
                .map(|(id, _)| id.to_string())
                .collect::<Vec<_>>(),
        });
        fs::write(
            result_dir.join(BUILDINFO_FILE),
            serde_json::to_vec_pretty(&full)?,
        )?;
        Ok(())
    }
}

fn missing(info: &BuildInfo, requirement: &str) -> Error {
    Error::MissingDependency {
        package: info.name.clone(),
        requirement: requirement.to_string(),
    }
}
