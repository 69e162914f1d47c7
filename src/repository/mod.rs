// src/repository/mod.rs

//! On-disk package repository
//!
//! A repository is a directory whose immediate subdirectories are named by
//! package id and each contain a `pkginfo.json`. Entries are immutable once
//! added; they are only ever created whole by a [`Fetcher`] or deleted.
//!
//! The id listing is cached per instance. The cache is dropped by every
//! [`Repository::add`] and [`Repository::remove`] made through the same
//! instance; changes made by other processes are only picked up by
//! [`Repository::rescan`] or a fresh instance.

mod archive;
mod client;
mod fetcher;

pub use archive::{create_tarball, extract_stripped, extract_tarball, TarballFormat};
pub use client::HttpClient;
pub use fetcher::{parse_base_url, Fetcher, HttpFetcher, LocalCopyFetcher, TarballFetcher};

use crate::error::{Error, Result};
use crate::filesystem::{exists_nofollow, remove_path};
use crate::package::{Package, PackageId, PkgInfo, PKGINFO_FILE};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A directory of packages keyed by id
#[derive(Debug)]
pub struct Repository {
    path: PathBuf,
    ids: RefCell<Option<BTreeSet<PackageId>>>,
}

impl Repository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ids: RefCell::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory a package lives in, whether or not it exists
    pub fn package_path(&self, id: &PackageId) -> PathBuf {
        self.path.join(id.to_string())
    }

    /// All valid package ids in the repository
    ///
    /// Entries whose names are not valid ids are skipped. A missing
    /// repository directory lists as empty.
    pub fn list(&self) -> Result<BTreeSet<PackageId>> {
        if let Some(ids) = self.ids.borrow().as_ref() {
            return Ok(ids.clone());
        }

        let ids = self.scan()?;
        *self.ids.borrow_mut() = Some(ids.clone());
        Ok(ids)
    }

    /// Drop the cached listing and read the directory again
    pub fn rescan(&self) -> Result<BTreeSet<PackageId>> {
        self.invalidate();
        self.list()
    }

    fn invalidate(&self) {
        *self.ids.borrow_mut() = None;
    }

    fn scan(&self) -> Result<BTreeSet<PackageId>> {
        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = BTreeSet::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !PackageId::is_id(name) {
                continue;
            }
            match PackageId::parse(name) {
                Ok(id) => {
                    ids.insert(id);
                }
                Err(e) => debug!("Skipping repository entry {}: {}", name, e),
            }
        }

        debug!("Found {} packages in {}", ids.len(), self.path.display());
        Ok(ids)
    }

    pub fn has_package(&self, id: &PackageId) -> Result<bool> {
        Ok(self.list()?.contains(id))
    }

    /// Ids of every version of `name` in the repository
    pub fn ids_for_name(&self, name: &str) -> Result<BTreeSet<PackageId>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|id| id.name() == name)
            .collect())
    }

    /// Load one package's metadata
    pub fn load(&self, id: &PackageId) -> Result<Package> {
        let path = self.package_path(id);
        let info_path = path.join(PKGINFO_FILE);

        let contents = fs::read_to_string(&info_path).map_err(|e| Error::CorruptPackage {
            id: id.to_string(),
            reason: format!("unable to read {}: {}", info_path.display(), e),
        })?;
        let info = PkgInfo::from_json(&contents).map_err(|reason| Error::CorruptPackage {
            id: id.to_string(),
            reason: format!("{}: {}", PKGINFO_FILE, reason),
        })?;

        Ok(Package::new(id.clone(), path, info))
    }

    /// Load several packages, failing on the first corrupt one
    pub fn load_packages<'a, I>(&self, ids: I) -> Result<Vec<Package>>
    where
        I: IntoIterator<Item = &'a PackageId>,
    {
        ids.into_iter().map(|id| self.load(id)).collect()
    }

    /// Add a package through `fetcher`
    ///
    /// Returns `false` without calling the fetcher if the package directory
    /// already exists. A failed fetch is not cleaned up.
    pub fn add(&self, fetcher: &dyn Fetcher, id: &PackageId, warn_if_present: bool) -> Result<bool> {
        let target = self.package_path(id);
        if exists_nofollow(&target) {
            if warn_if_present {
                warn!("Package {} is already in the repository", id);
            }
            return Ok(false);
        }

        fs::create_dir_all(&self.path)?;
        self.invalidate();
        fetcher.fetch(id, &target)?;

        info!("Added {} to {}", id, self.path.display());
        Ok(true)
    }

    /// Delete a package; absent packages are not an error
    pub fn remove(&self, id: &PackageId) -> Result<()> {
        let path = self.package_path(id);
        if !exists_nofollow(&path) {
            debug!("Package {} not present, nothing to remove", id);
            return Ok(());
        }

        self.invalidate();
        remove_path(&path)?;
        info!("Removed {} from {}", id, self.path.display());
        Ok(())
    }

    /// Verify repository contents against a trusted source
    ///
    /// There is no signature or checksum scheme for packages, so this
    /// always fails rather than reporting a check that never happened.
    pub fn integrity_check(&self) -> Result<()> {
        Err(Error::Unsupported(
            "repository integrity checking is not implemented; packages are not signed".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_package(root: &Path, id: &str, pkginfo: &str) {
        let dir = root.join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(PKGINFO_FILE), pkginfo).unwrap();
    }

    fn id(s: &str) -> PackageId {
        PackageId::parse(s).unwrap()
    }

    #[test]
    fn test_list_skips_invalid_entries() {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), "mesos--0.22.0", "{}");
        write_package(temp.path(), "mesos--0.23.0", "{}");
        write_package(temp.path(), "not-a-package", "{}");
        write_package(temp.path(), "bad--ver-sion", "{}");
        fs::write(temp.path().join("file--1"), "").unwrap();

        let repo = Repository::new(temp.path());
        let ids: Vec<String> = repo.list().unwrap().iter().map(ToString::to_string).collect();
        assert_eq!(ids, vec!["mesos--0.22.0", "mesos--0.23.0"]);
        assert_eq!(repo.ids_for_name("mesos").unwrap().len(), 2);
        assert!(repo.ids_for_name("zk").unwrap().is_empty());
    }

    #[test]
    fn test_missing_repository_is_empty() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::new(temp.path().join("missing"));
        assert!(repo.list().unwrap().is_empty());
    }

    #[test]
    fn test_listing_is_cached_until_rescan() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::new(temp.path());
        assert!(repo.list().unwrap().is_empty());

        write_package(temp.path(), "a--1", "{}");
        assert!(!repo.has_package(&id("a--1")).unwrap());
        assert!(repo.rescan().unwrap().contains(&id("a--1")));
    }

    #[test]
    fn test_add_and_remove_invalidate_listing() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::new(temp.path().join("repo"));
        assert!(repo.list().unwrap().is_empty());

        let fetcher = |_: &PackageId, target: &Path| -> Result<()> {
            fs::create_dir_all(target)?;
            fs::write(target.join(PKGINFO_FILE), "{}")?;
            Ok(())
        };

        assert!(repo.add(&fetcher, &id("a--1"), true).unwrap());
        assert!(repo.has_package(&id("a--1")).unwrap());

        repo.remove(&id("a--1")).unwrap();
        assert!(!repo.has_package(&id("a--1")).unwrap());
        repo.remove(&id("a--1")).unwrap();
    }

    #[test]
    fn test_add_existing_skips_fetcher() {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), "a--1", "{}");
        let repo = Repository::new(temp.path());

        let fetcher = |_: &PackageId, _: &Path| -> Result<()> {
            panic!("fetcher must not run for an existing package");
        };
        assert!(!repo.add(&fetcher, &id("a--1"), false).unwrap());
    }

    #[test]
    fn test_failed_fetch_is_detected_on_load() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::new(temp.path());
        let fetcher = |_: &PackageId, target: &Path| -> Result<()> {
            fs::create_dir_all(target)?;
            Err(Error::Download("connection reset".to_string()))
        };

        assert!(repo.add(&fetcher, &id("a--1"), true).is_err());
        assert!(matches!(
            repo.load(&id("a--1")),
            Err(Error::CorruptPackage { .. })
        ));
    }

    #[test]
    fn test_load() {
        let temp = TempDir::new().unwrap();
        write_package(
            temp.path(),
            "mesos-config--abcd1234",
            r#"{"requires": ["mesos--0.22.0"], "environment": {"MESOS_CONF": "/etc/mesos"}}"#,
        );
        let repo = Repository::new(temp.path());

        let pkg = repo.load(&id("mesos-config--abcd1234")).unwrap();
        assert!(pkg.requires().contains("mesos--0.22.0"));
        assert_eq!(pkg.environment()["MESOS_CONF"], "/etc/mesos");
        assert_eq!(pkg.path(), temp.path().join("mesos-config--abcd1234"));
    }

    #[test]
    fn test_load_corrupt() {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), "a--1", "[1, 2]");
        fs::create_dir_all(temp.path().join("b--1")).unwrap();
        let repo = Repository::new(temp.path());

        for bad in ["a--1", "b--1", "c--1"] {
            match repo.load(&id(bad)) {
                Err(Error::CorruptPackage { id, .. }) => assert_eq!(id, bad),
                other => panic!("expected corrupt package for {}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_integrity_check_unsupported() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::new(temp.path());
        assert!(matches!(repo.integrity_check(), Err(Error::Unsupported(_))));
    }
}
