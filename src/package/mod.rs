// src/package/mod.rs

//! Package identity and metadata
//!
//! A [`Package`] is the read-only view of one repository entry: its
//! [`PackageId`], the directory it lives in, and the contents of its
//! `pkginfo.json`.

mod id;
mod info;

pub use id::{validate_name, validate_version, PackageId, PackageIdError, DELIMITER};
pub use info::{PackageKind, PkgInfo};

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Name of the metadata file at the root of every package directory
pub const PKGINFO_FILE: &str = "pkginfo.json";

/// Name of the build metadata file written by the build pipeline
pub const BUILDINFO_FILE: &str = "buildinfo.full.json";

/// A package loaded from a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    id: PackageId,
    path: PathBuf,
    info: PkgInfo,
}

impl Package {
    pub fn new(id: PackageId, path: impl Into<PathBuf>, info: PkgInfo) -> Self {
        Self {
            id,
            path: path.into(),
            info,
        }
    }

    pub fn id(&self) -> &PackageId {
        &self.id
    }

    pub fn name(&self) -> &str {
        self.id.name()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn requires(&self) -> &BTreeSet<String> {
        &self.info.requires
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.info.environment
    }

    pub fn kind(&self) -> PackageKind {
        self.info.kind
    }

    pub fn info(&self) -> &PkgInfo {
        &self.info
    }

    /// Full build metadata shipped inside the package, if any
    ///
    /// Packages seeded from setup directories are never built and carry none.
    pub fn buildinfo(&self) -> crate::Result<Option<serde_json::Value>> {
        let contents = match std::fs::read_to_string(self.path.join(BUILDINFO_FILE)) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_accessors() {
        let id = PackageId::parse("mesos--0.22.0").unwrap();
        let mut info = PkgInfo::default();
        info.requires.insert("zookeeper".to_string());
        let pkg = Package::new(id.clone(), "/repo/mesos--0.22.0", info);

        assert_eq!(pkg.id(), &id);
        assert_eq!(pkg.name(), "mesos");
        assert_eq!(pkg.path(), Path::new("/repo/mesos--0.22.0"));
        assert!(pkg.requires().contains("zookeeper"));
        assert_eq!(pkg.kind(), PackageKind::Generic);
        assert_eq!(pkg.to_string(), "mesos--0.22.0");
    }

    #[test]
    fn test_buildinfo_optional() {
        let temp = TempDir::new().unwrap();
        let id = PackageId::parse("a--1").unwrap();
        let pkg = Package::new(id, temp.path(), PkgInfo::default());
        assert!(pkg.buildinfo().unwrap().is_none());

        fs::write(temp.path().join(BUILDINFO_FILE), r#"{"name": "a"}"#).unwrap();
        assert_eq!(pkg.buildinfo().unwrap().unwrap()["name"], "a");

        fs::write(temp.path().join(BUILDINFO_FILE), "{").unwrap();
        assert!(pkg.buildinfo().is_err());
    }
}
