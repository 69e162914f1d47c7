// src/package/id.rs

//! Package identity: `name--version`
//!
//! The blob after `--` is never introspected; it only has to satisfy the
//! version grammar. Names may contain single hyphens, versions may not, so
//! the first and only `--` always splits an id unambiguously.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Separator between name and version
pub const DELIMITER: &str = "--";

/// A validated package identity
///
/// Immutable once constructed; the canonical string form is exactly
/// `name--version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId {
    name: String,
    version: String,
}

impl PackageId {
    /// Parse an id of the form `name--version`
    pub fn parse(s: &str) -> Result<Self, PackageIdError> {
        let count = s.matches(DELIMITER).count();
        if count != 1 {
            return Err(PackageIdError::Delimiter {
                id: s.to_string(),
                count,
            });
        }

        // count == 1 guarantees the split succeeds
        let (name, version) = s
            .split_once(DELIMITER)
            .ok_or_else(|| PackageIdError::Delimiter {
                id: s.to_string(),
                count,
            })?;

        Self::from_parts(name, version)
    }

    /// Build an id from its components, validating both
    pub fn from_parts(name: &str, version: &str) -> Result<Self, PackageIdError> {
        validate_name(name)?;
        validate_version(version)?;

        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
        })
    }

    /// Cheap syntactic pre-check: exactly one `--`
    pub fn is_id(s: &str) -> bool {
        s.matches(DELIMITER).count() == 1
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

/// `[a-zA-Z0-9@_+][a-zA-Z0-9@._+-]*`
pub fn validate_name(name: &str) -> Result<(), PackageIdError> {
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '_' | '+'));
    let rest_ok =
        chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | '+' | '-'));

    if first_ok && rest_ok {
        Ok(())
    } else {
        Err(PackageIdError::InvalidName(name.to_string()))
    }
}

/// `[a-zA-Z0-9@_+:.]+`
pub fn validate_version(version: &str) -> Result<(), PackageIdError> {
    let valid = !version.is_empty()
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '_' | '+' | ':' | '.'));

    if valid {
        Ok(())
    } else {
        Err(PackageIdError::InvalidVersion(version.to_string()))
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, DELIMITER, self.version)
    }
}

impl FromStr for PackageId {
    type Err = PackageIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PackageId::parse(s)
    }
}

impl Serialize for PackageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PackageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PackageId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when parsing a package id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageIdError {
    /// Zero or several `--` separators
    Delimiter { id: String, count: usize },
    /// Name does not match the name grammar
    InvalidName(String),
    /// Version does not match the version grammar
    InvalidVersion(String),
}

impl fmt::Display for PackageIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delimiter { id, count } => write!(
                f,
                "Invalid package id {}. Package ids must contain exactly one '--' \
                 separating the name and version (found {})",
                id, count
            ),
            Self::InvalidName(name) => write!(
                f,
                "Invalid package name {}. Names start with [a-zA-Z0-9@_+] followed by [a-zA-Z0-9@._+-]",
                name
            ),
            Self::InvalidVersion(version) => write!(
                f,
                "Invalid package version {}. Versions may only contain [a-zA-Z0-9@_+:.]",
                version
            ),
        }
    }
}

impl std::error::Error for PackageIdError {}
