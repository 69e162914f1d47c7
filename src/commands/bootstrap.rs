// src/commands/bootstrap.rs
//! Bootstrap tarball assembly
//!
//! Builds a complete install under a scratch directory laid out like the
//! target filesystem, then packs `opt/mesosphere` so it can be unpacked on a
//! new host. Units are neither linked nor started here; the host does that
//! with `pkgpanda setup`.

use anyhow::{Context, Result};
use pkgpanda::config::DEFAULT_ROOT;
use pkgpanda::filesystem::{remove_path, rewrite_symlinks};
use pkgpanda::install::unit_names;
use pkgpanda::repository::create_tarball;
use pkgpanda::{Install, InstallConfig, Repository, TarballFetcher};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Marker that tells the host's setup unit this tree came from a bootstrap
const BOOTSTRAP_MARKER: &str = "bootstrap";

pub fn cmd_bootstrap(
    build_root: &Path,
    roles: &[String],
    packages: &[PathBuf],
    output: &Path,
) -> Result<()> {
    let build_root = std::path::absolute(build_root)?;
    let relative_root = DEFAULT_ROOT.trim_start_matches('/');
    let pkgpanda_root = build_root.join(relative_root);
    let config_dir = build_root.join("etc/mesosphere");

    let repository = Repository::new(pkgpanda_root.join("packages"));
    let mut ids = Vec::new();
    for tarball in packages {
        let id = TarballFetcher::id_from_filename(tarball)?;
        repository
            .add(&TarballFetcher::new(tarball), &id, true)
            .with_context(|| format!("Failed to add {}", tarball.display()))?;
        ids.push(id);
    }

    let roles_dir = config_dir.join("roles");
    remove_path(&roles_dir)?;
    fs::create_dir_all(&roles_dir)?;
    for role in roles {
        fs::write(roles_dir.join(role), "")
            .with_context(|| format!("Failed to mark role {}", role))?;
    }

    // The wants directory goes inside the tree so the build host's systemd
    // is never touched
    let install = Install::new(InstallConfig {
        root: pkgpanda_root.clone(),
        config_dir: Some(config_dir),
        rooted_systemd: true,
        manage_systemd: false,
        block_systemd: true,
        env_root: Some(PathBuf::from(DEFAULT_ROOT)),
    })?;
    let loaded = repository.load_packages(&ids)?;
    install.activate(&repository, &loaded)?;

    // Each host activates and starts its own units during setup
    let wants = install.systemd_dir();
    if let Some(link_dir) = wants.parent() {
        for unit in unit_names(wants)? {
            remove_path(&link_dir.join(unit))?;
        }
    }
    remove_path(wants)?;

    fs::write(pkgpanda_root.join(BOOTSTRAP_MARKER), "")?;

    let active: Vec<String> = ids.iter().map(ToString::to_string).collect();
    let active_json = output.with_file_name("active.json");
    fs::write(&active_json, serde_json::to_vec_pretty(&active)?)
        .with_context(|| format!("Failed to write {}", active_json.display()))?;

    let rewritten = rewrite_symlinks(&build_root, &build_root, Path::new("/"))?;
    info!("Re-rooted {} symlinks at /", rewritten);

    create_tarball(&pkgpanda_root, output)
        .with_context(|| format!("Failed to pack {}", output.display()))?;
    println!("Bootstrap tarball: {}", output.display());
    println!("Active packages: {}", active_json.display());
    Ok(())
}
