// src/install/validate.rs

//! Consistency check for a candidate active set
//!
//! Every problem is collected rather than stopping at the first, and the
//! result is canonically sorted, so any permutation of the same packages
//! reports the same errors.

use super::RESERVED_ENV_VARS;
use crate::error::{ValidationError, ValidationErrors};
use crate::package::Package;
use std::collections::{BTreeMap, BTreeSet};

/// Marker used as the first contributor of a reserved environment key
pub const RESERVED_CONTRIBUTOR: &str = "reserved";

/// Check that `packages` can be active together
///
/// Roles select which role-specific directories get merged but never change
/// whether a set is compatible; they are accepted so callers pass the same
/// host context they activate with.
pub fn validate_compatible(
    packages: &[Package],
    _roles: &[String],
) -> std::result::Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    let mut by_name: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for package in packages {
        by_name
            .entry(package.name())
            .or_default()
            .push(package.id().to_string());
    }
    for (name, ids) in &by_name {
        if ids.len() > 1 {
            let mut ids = ids.clone();
            ids.sort();
            errors.push(ValidationError::DuplicateName {
                name: name.to_string(),
                ids,
            });
        }
    }

    let names: BTreeSet<&str> = packages.iter().map(Package::name).collect();
    let ids: BTreeSet<String> = packages.iter().map(|p| p.id().to_string()).collect();
    for package in packages {
        for requirement in package.requires() {
            if !names.contains(requirement.as_str()) && !ids.contains(requirement) {
                errors.push(ValidationError::UnmetDependency {
                    package: package.id().to_string(),
                    requirement: requirement.clone(),
                });
            }
        }
    }

    let mut contributors: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for package in packages {
        for key in package.environment().keys() {
            if RESERVED_ENV_VARS.contains(&key.as_str()) {
                errors.push(ValidationError::EnvironmentConflict {
                    key: key.clone(),
                    first: RESERVED_CONTRIBUTOR.to_string(),
                    second: package.id().to_string(),
                });
            } else {
                contributors
                    .entry(key.as_str())
                    .or_default()
                    .push(package.id().to_string());
            }
        }
    }
    for (key, mut owners) in contributors {
        owners.sort();
        for other in &owners[1..] {
            errors.push(ValidationError::EnvironmentConflict {
                key: key.to_string(),
                first: owners[0].clone(),
                second: other.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors::new(errors))
    }
}
