// src/build/sources.rs

//! Build sources
//!
//! Each source resolves to a stable id (a commit, a verified digest or a
//! tree digest) that feeds the package version, and can then be checked out
//! into the build's `src/` directory.

use crate::error::{Error, Result};
use crate::filesystem::{copy_tree, remove_path};
use crate::hash::{hash_file, hash_tree, is_sha256};
use crate::repository::{extract_stripped, HttpClient};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Where a source comes from, selected by its `kind` field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum Source {
    /// A remote git repository pinned to a commit
    Git {
        git: String,
        #[serde(rename = "ref")]
        reference: String,
        /// Branch the ref is expected to track; only used for a warning
        #[serde(default)]
        ref_origin: Option<String>,
    },
    /// A clean local git checkout, built at its HEAD
    GitLocal { rel_path: PathBuf },
    /// A single downloaded file, copied into `src/<name>/`
    Url { url: String, sha256: String },
    /// A downloaded archive, extracted with its top-level directory stripped
    UrlExtract { url: String, sha256: String },
    /// A directory next to the buildinfo, identified by its tree digest
    LocalDir { path: PathBuf },
}

/// Stable identifier of a resolved source
pub type SourceId = BTreeMap<String, String>;

impl Source {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Git { .. } => "git",
            Self::GitLocal { .. } => "git_local",
            Self::Url { .. } => "url",
            Self::UrlExtract { .. } => "url_extract",
            Self::LocalDir { .. } => "local_dir",
        }
    }

    /// Fetch what is needed and compute the source's id
    ///
    /// Downloads and git mirrors are cached under `<package_dir>/cache`.
    pub fn resolve(&self, name: &str, package_dir: &Path) -> Result<SourceId> {
        let cache = package_dir.join("cache");
        match self {
            Self::Git {
                git,
                reference,
                ref_origin,
            } => {
                if !is_git_sha(reference) {
                    return Err(Error::Build(format!(
                        "Source {name}: ref must be a full git commit sha, got '{reference}'"
                    )));
                }
                let bare = cache.join(format!("{name}.git"));
                fetch_git(&bare, git)?;
                let commit = git_commit(&bare, reference)?;

                if let Some(origin) = ref_origin {
                    match git_commit(&bare, origin) {
                        Ok(origin_commit) if origin_commit == commit => {}
                        Ok(origin_commit) => warn!(
                            "Source {}: ref {} does not match {} ({}); the package ref should probably be updated",
                            name, commit, origin, origin_commit
                        ),
                        Err(e) => warn!("Source {}: unable to resolve ref_origin {}: {}", name, origin, e),
                    }
                }

                Ok(single("commit", commit))
            }
            Self::GitLocal { rel_path } => {
                let repo = local_repo_path(package_dir, rel_path)?;
                let status = run_git(&["-C", &repo.to_string_lossy(), "status", "--porcelain", "-uno", "-z"])?;
                if !status.is_empty() {
                    return Err(Error::Build(format!(
                        "Source {name}: local changes are not allowed in {}; commit or stash them first",
                        repo.display()
                    )));
                }
                let commit = git_commit(&repo.join(".git"), "HEAD")?;
                Ok(single("commit", commit))
            }
            Self::Url { url, sha256 } | Self::UrlExtract { url, sha256 } => {
                let cached = cache.join(url_filename(url)?);
                if !cached.exists() {
                    fs::create_dir_all(&cache)?;
                    download(url, &cached)?;
                }
                verify_download(&cached, sha256, url)?;
                Ok(single("downloaded_sha256", sha256.clone()))
            }
            Self::LocalDir { path } => {
                let dir = local_repo_path(package_dir, path)?;
                Ok(single("tree_sha256", hash_tree(&dir)?))
            }
        }
    }

    /// Materialize a resolved source in `dest`
    pub fn checkout_to(&self, name: &str, package_dir: &Path, id: &SourceId, dest: &Path) -> Result<()> {
        let cache = package_dir.join("cache");
        debug!("Checking out {} source {} into {}", self.kind(), name, dest.display());

        match self {
            Self::Git { .. } => {
                let commit = id_field(id, "commit")?;
                let bare = cache.join(format!("{name}.git"));
                clone_at(&bare, commit, dest)
            }
            Self::GitLocal { rel_path } => {
                let commit = id_field(id, "commit")?;
                clone_at(&local_repo_path(package_dir, rel_path)?, commit, dest)
            }
            Self::Url { url, .. } => {
                fs::create_dir_all(dest)?;
                let filename = url_filename(url)?;
                fs::copy(cache.join(&filename), dest.join(&filename))?;
                Ok(())
            }
            Self::UrlExtract { url, .. } => extract_stripped(&cache.join(url_filename(url)?), dest),
            Self::LocalDir { path } => copy_tree(&local_repo_path(package_dir, path)?, dest),
        }
    }
}

fn single(key: &str, value: String) -> SourceId {
    BTreeMap::from([(key.to_string(), value)])
}

fn id_field<'a>(id: &'a SourceId, key: &str) -> Result<&'a str> {
    id.get(key)
        .map(String::as_str)
        .ok_or_else(|| Error::Build(format!("Source id is missing '{key}'")))
}

/// A path relative to the package directory that stays inside its parent
fn local_repo_path(package_dir: &Path, rel: &Path) -> Result<PathBuf> {
    if rel.is_absolute() {
        return Err(Error::Build(format!(
            "{} must be relative to the package directory so other checkouts build the same way",
            rel.display()
        )));
    }
    let mut path = package_dir.to_path_buf();
    for component in rel.components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::ParentDir => {
                path.pop();
            }
            _ => {}
        }
    }
    Ok(path)
}

/// Last path segment of a URL, used as the cache file name
pub fn url_filename(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url).map_err(|e| Error::Build(format!("Invalid source URL {url}: {e}")))?;
    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::Build(format!("Source URL {url} does not name a file")))
}

fn download(url: &str, dest: &Path) -> Result<()> {
    let parsed = url::Url::parse(url).map_err(|e| Error::Build(format!("Invalid source URL {url}: {e}")))?;
    info!("Downloading {}", url);

    if parsed.scheme() == "file" {
        let src = parsed
            .to_file_path()
            .map_err(|_| Error::Build(format!("Invalid file URL {url}")))?;
        fs::copy(&src, dest)?;
        return Ok(());
    }

    // Partial downloads must never look like a cached file
    let partial = dest.with_extension("partial");
    HttpClient::new()?.download_file(url, &partial, None)?;
    fs::rename(&partial, dest)?;
    Ok(())
}

/// Check a cached download, moving it aside to `.corrupt` on mismatch
fn verify_download(path: &Path, expected: &str, url: &str) -> Result<()> {
    if !is_sha256(expected) {
        return Err(Error::Build(format!(
            "sha256 for {url} must be 64 hex characters, got '{expected}'"
        )));
    }

    let actual = hash_file(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        return Ok(());
    }

    let mut corrupt = path.as_os_str().to_owned();
    corrupt.push(".corrupt");
    let corrupt = PathBuf::from(corrupt);
    remove_path(&corrupt)?;
    fs::rename(path, &corrupt)?;
    Err(Error::Build(format!(
        "Provided sha256 didn't match the downloaded file, corrupt download saved as {}. \
         Provided: {}, downloaded: {}, url: {}",
        corrupt.display(),
        expected,
        actual,
        url
    )))
}

fn is_git_sha(s: &str) -> bool {
    s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn run_git(args: &[&str]) -> Result<String> {
    let git = which::which("git").map_err(|e| Error::NotFound(format!("git not found in PATH: {e}")))?;
    let output = Command::new(git)
        .args(args)
        .output()
        .map_err(|e| Error::IoError(format!("Failed to run git: {e}")))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(Error::CommandFailed {
            command: format!("git {}", args.join(" ")),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn git_commit(git_dir: &Path, reference: &str) -> Result<String> {
    let rev = format!("{reference}^{{commit}}");
    run_git(&["--git-dir", &git_dir.to_string_lossy(), "rev-parse", &rev]).map_err(|e| {
        Error::Build(format!(
            "Unable to find ref '{}' in '{}': {}",
            reference,
            git_dir.display(),
            e
        ))
    })
}

/// Mirror `uri` into `bare`, or refresh an existing mirror
fn fetch_git(bare: &Path, uri: &str) -> Result<()> {
    let bare_str = bare.to_string_lossy();
    if bare.exists() {
        run_git(&["--git-dir", &bare_str, "remote", "set-url", "origin", uri])?;
        run_git(&["--git-dir", &bare_str, "remote", "update", "origin"])?;
    } else {
        if let Some(parent) = bare.parent() {
            fs::create_dir_all(parent)?;
        }
        run_git(&["clone", "--mirror", uri, &bare_str])?;
    }
    Ok(())
}

fn clone_at(repo: &Path, commit: &str, dest: &Path) -> Result<()> {
    let dest_str = dest.to_string_lossy();
    run_git(&["clone", "-q", &repo.to_string_lossy(), &dest_str])?;
    run_git(&[
        "--git-dir",
        &dest.join(".git").to_string_lossy(),
        "--work-tree",
        &dest_str,
        "checkout",
        "-f",
        "-q",
        commit,
    ])?;
    Ok(())
}
