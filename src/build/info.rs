// src/build/info.rs

//! `buildinfo.json`: how to build one package

use super::sources::Source;
use crate::error::{Error, Result};
use crate::package::{validate_name, validate_version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Toolchain image used when a package does not name one
pub const DEFAULT_DOCKER_IMAGE: &str = "ubuntu:14.04";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildInfo {
    pub name: String,

    /// Named sources, checked out into `src/<name>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<BTreeMap<String, Source>>,

    /// Shorthand for a single source named after the package
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single_source: Option<Source>,

    /// Names or ids of locally built packages the build depends on
    #[serde(default)]
    pub requires: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<String>,

    /// Human-readable prefix for the content hash version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_extra: Option<String>,

    /// Environment the package contributes once active
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl BuildInfo {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Build(format!("Unable to read {}: {}", path.display(), e))
        })?;
        let info: BuildInfo = serde_json::from_str(&contents)
            .map_err(|e| Error::Build(format!("Invalid {}: {}", path.display(), e)))?;
        info.validate()?;
        Ok(info)
    }

    fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        if let Some(extra) = &self.version_extra {
            validate_version(extra)?;
        }
        Ok(())
    }

    /// Sources keyed by name; exactly one of `sources` or `single_source`
    pub fn all_sources(&self) -> Result<BTreeMap<String, Source>> {
        match (&self.sources, &self.single_source) {
            (Some(sources), None) if !sources.is_empty() => Ok(sources.clone()),
            (None, Some(source)) => Ok(BTreeMap::from([(self.name.clone(), source.clone())])),
            (Some(_), Some(_)) => Err(Error::Build(
                "Specify only one of 'sources' or 'single_source'".to_string(),
            )),
            _ => Err(Error::Build(
                "Must specify at least one source to build the package from using 'sources' or 'single_source'"
                    .to_string(),
            )),
        }
    }

    pub fn docker_image(&self) -> &str {
        self.docker.as_deref().unwrap_or(DEFAULT_DOCKER_IMAGE)
    }
}
