// src/error.rs

//! Error types for pkgpanda
//!
//! Expected input problems (bad ids, incompatible package sets, merge
//! conflicts, corrupt repository entries) are separate variants from
//! [`Error::InvariantViolation`], which signals a broken precondition inside
//! the install engine rather than something the caller can fix.

use crate::package::PackageIdError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by pkgpanda operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed `name--version` string
    #[error(transparent)]
    InvalidPackageId(#[from] PackageIdError),

    /// The requested active set is not internally consistent
    #[error("{0}")]
    Validation(ValidationErrors),

    /// Two packages contribute a file and a directory at the same path
    #[error(
        "Can't merge '{}' into '{}': a file and a directory (or another package's symlink) share the path",
        .src.display(),
        .dest.display()
    )]
    MergeConflict { src: PathBuf, dest: PathBuf },

    /// A repository entry exists but its metadata is missing or malformed
    #[error("Corrupt package {id}: {reason}")]
    CorruptPackage { id: String, reason: String },

    /// Internal precondition failed (incomplete generation, unreadable marker, ...)
    #[error("Install invariant violated: {0}")]
    InvariantViolation(String),

    /// The host has no usable active set
    #[error("{0}")]
    InstallError(String),

    /// An external command exited unsuccessfully
    #[error("Command `{command}` failed{}: {stderr}", .code.map(|c| format!(" with exit status {}", c)).unwrap_or_default())]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// A build requires a package that has not been built locally
    #[error("Package {package} requires {requirement}, which has not been built")]
    MissingDependency {
        package: String,
        requirement: String,
    },

    #[error("Download error: {0}")]
    Download(String),

    #[error("Build error: {0}")]
    Build(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Deliberately unimplemented functionality
    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Error::Validation(errors)
    }
}

/// A single reason a set of packages cannot be active together
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationError {
    /// More than one package with the same name
    DuplicateName { name: String, ids: Vec<String> },
    /// A `requires` entry matches no name or id in the set
    UnmetDependency { package: String, requirement: String },
    /// An environment key declared twice, or a reserved key declared at all
    EnvironmentConflict {
        key: String,
        first: String,
        second: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateName { name, ids } => {
                write!(f, "Repeated name {} in set of packages {}", name, ids.join(" "))
            }
            Self::UnmetDependency {
                package,
                requirement,
            } => write!(
                f,
                "Package {} requires {} but that is not in the set of packages",
                package, requirement
            ),
            Self::EnvironmentConflict { key, first, second } => write!(
                f,
                "Environment variable {} is declared by both {} and {}",
                key, first, second
            ),
        }
    }
}

/// Non-empty, canonically ordered collection of validation failures
///
/// Ordering is independent of the order packages were supplied in, so two
/// permutations of the same input always report the same errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub(crate) fn new(mut errors: Vec<ValidationError>) -> Self {
        errors.sort();
        errors.dedup();
        Self(errors)
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<ValidationError> {
        self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "Validation failed: {}", messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}
