// src/repository/fetcher.rs

//! Fetchers populate a repository package directory
//!
//! A fetcher receives the id being added and the directory it must fill. On
//! success that directory holds a package layout; on failure the repository
//! does not clean up, and a half-populated entry surfaces as a corrupt
//! package on the next load.

use super::archive::extract_tarball;
use super::client::HttpClient;
use crate::error::{Error, Result};
use crate::filesystem::copy_tree;
use crate::package::PackageId;
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use tracing::info;

/// Populates `target` with the contents of package `id`
pub trait Fetcher {
    fn fetch(&self, id: &PackageId, target: &Path) -> Result<()>;
}

impl<F> Fetcher for F
where
    F: Fn(&PackageId, &Path) -> Result<()>,
{
    fn fetch(&self, id: &PackageId, target: &Path) -> Result<()> {
        self(id, target)
    }
}

/// Copies `<source_dir>/<id>` into place
///
/// Used to seed a repository from a directory of unpacked packages.
#[derive(Debug, Clone)]
pub struct LocalCopyFetcher {
    source_dir: PathBuf,
}

impl LocalCopyFetcher {
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
        }
    }
}

impl Fetcher for LocalCopyFetcher {
    fn fetch(&self, id: &PackageId, target: &Path) -> Result<()> {
        let src = self.source_dir.join(id.to_string());
        info!("Copying {} from {}", id, src.display());
        copy_tree(&src, target)
    }
}

/// Extracts a local package tarball
#[derive(Debug, Clone)]
pub struct TarballFetcher {
    tarball: PathBuf,
}

impl TarballFetcher {
    pub fn new(tarball: impl Into<PathBuf>) -> Self {
        Self {
            tarball: tarball.into(),
        }
    }

    /// Derive the package id from a tarball named `<id>.tar.xz` (or similar)
    pub fn id_from_filename(tarball: &Path) -> Result<PackageId> {
        let name = tarball
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::NotFound(format!("{} has no file name", tarball.display())))?;

        let stem = [".tar.xz", ".tar.gz", ".tgz", ".txz", ".tar"]
            .iter()
            .find_map(|ext| name.strip_suffix(ext))
            .ok_or_else(|| {
                Error::Unsupported(format!("{} is not a package tarball", tarball.display()))
            })?;

        Ok(PackageId::parse(stem)?)
    }
}

impl Fetcher for TarballFetcher {
    fn fetch(&self, id: &PackageId, target: &Path) -> Result<()> {
        info!("Extracting {} from {}", id, self.tarball.display());
        extract_tarball(&self.tarball, target)
    }
}

/// Downloads `<base>/packages/<name>/<id>.tar.xz` and extracts it
pub struct HttpFetcher {
    base_url: url::Url,
    client: HttpClient,
    progress: Option<ProgressBar>,
}

impl HttpFetcher {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = parse_base_url(base_url)?;
        Ok(Self {
            base_url,
            client: HttpClient::new()?,
            progress: None,
        })
    }

    /// Report download progress on `progress`
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn package_url(&self, id: &PackageId) -> Result<url::Url> {
        self.base_url
            .join(&format!("packages/{}/{}.tar.xz", id.name(), id))
            .map_err(|e| Error::Download(format!("Invalid package URL for {id}: {e}")))
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    pub fn base_url(&self) -> &url::Url {
        &self.base_url
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, id: &PackageId, target: &Path) -> Result<()> {
        let url = self.package_url(id)?;
        info!("Fetching {} from {}", id, url);

        let download_dir = tempfile::tempdir()?;
        let tarball = download_dir.path().join(format!("{id}.tar.xz"));
        self.client
            .download_file(url.as_str(), &tarball, self.progress.as_ref())?;

        extract_tarball(&tarball, target)
    }
}

/// Parse a repository base URL so relative joins keep the last path segment
pub fn parse_base_url(base: &str) -> Result<url::Url> {
    let normalized = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };
    url::Url::parse(&normalized)
        .map_err(|e| Error::Config(format!("Invalid repository URL {base}: {e}")))
}
