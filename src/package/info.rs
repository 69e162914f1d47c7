// src/package/info.rs

//! `pkginfo.json` metadata

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Closed set of package kinds
///
/// Selected by the `kind` field of `pkginfo.json`; absent means `generic`.
/// An unrecognized value is a corrupt package, not an extension point.
///
/// The kind is descriptive metadata only. Validation, staging and builds
/// treat every kind the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageKind {
    #[default]
    Generic,
    /// Ships systemd units under the wants directory
    Service,
    /// Host configuration generated for a cluster
    Config,
    /// Loadable module for another package
    Module,
}

impl PackageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Service => "service",
            Self::Config => "config",
            Self::Module => "module",
        }
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared metadata of a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkgInfo {
    /// Names or full ids that must be active alongside this package
    #[serde(default)]
    pub requires: BTreeSet<String>,

    /// Environment variables contributed to the host environment files
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    #[serde(default)]
    pub kind: PackageKind,
}

impl PkgInfo {
    /// Parse a `pkginfo.json` document, which must be a JSON object
    pub fn from_json(contents: &str) -> Result<Self, String> {
        let value: serde_json::Value =
            serde_json::from_str(contents).map_err(|e| format!("invalid JSON: {}", e))?;
        if !value.is_object() {
            return Err("pkginfo.json must contain a JSON object".to_string());
        }
        serde_json::from_value(value).map_err(|e| e.to_string())
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
