// src/filesystem/mod.rs

//! Filesystem primitives for pkgpanda
//!
//! This module provides:
//! - The durable publish primitive used for every piece of swap state
//! - The symlink-tree merge that assembles a generation from packages
//! - Small no-follow helpers for removing, copying and re-rooting trees

mod durable;
mod merge;

pub use durable::{publish_durably, publish_json, sync_parent};
pub use merge::symlink_tree;

use crate::{Error, Result};
use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Whether anything (including a dangling symlink) exists at `path`
pub fn exists_nofollow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Remove a file, symlink or directory tree; absent paths are fine
///
/// Symlinks are unlinked, never followed.
pub fn remove_path(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let result = if meta.file_type().is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Rename `from` to `to` unless `from` is already gone
///
/// Returns whether a rename happened. Used by the recovery path, where a
/// previous attempt may already have moved some entries.
pub fn rename_if_exists(from: &Path, to: &Path) -> Result<bool> {
    match fs::rename(from, to) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Recursively copy `src` to `dest`, preserving symlinks and permissions
pub fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    if !src.is_dir() {
        return Err(Error::NotFound(format!("{} is not a directory", src.display())));
    }

    for entry in WalkDir::new(src).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::IoError(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::IoError(e.to_string()))?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            fs::set_permissions(&target, entry.metadata().map_err(io::Error::other)?.permissions())?;
        } else if file_type.is_symlink() {
            symlink(fs::read_link(entry.path())?, &target)?;
        } else {
            // fs::copy carries permission bits over
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

/// Re-root absolute symlinks under `tree` that point into `old_root`
///
/// A link to `<old_root>/x` becomes a link to `<new_root>/x`. Relative
/// links and links elsewhere are left alone. Returns how many were changed.
pub fn rewrite_symlinks(tree: &Path, old_root: &Path, new_root: &Path) -> Result<usize> {
    let mut rewritten = 0;
    for entry in WalkDir::new(tree).follow_links(false) {
        let entry = entry.map_err(|e| Error::IoError(e.to_string()))?;
        if !entry.file_type().is_symlink() {
            continue;
        }

        let target = fs::read_link(entry.path())?;
        let Ok(rest) = target.strip_prefix(old_root) else {
            continue;
        };
        if !target.is_absolute() {
            continue;
        }

        let new_target = new_root.join(rest);
        fs::remove_file(entry.path())?;
        symlink(&new_target, entry.path())?;
        debug!(
            "Rewrote {} -> {}",
            entry.path().display(),
            new_target.display()
        );
        rewritten += 1;
    }
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_remove_path_variants() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("dir");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("nested/file"), "x").unwrap();
        let link = temp.path().join("link");
        symlink(&dir, &link).unwrap();

        remove_path(&link).unwrap();
        assert!(!exists_nofollow(&link));
        assert!(dir.join("nested/file").exists());

        remove_path(&dir).unwrap();
        assert!(!dir.exists());

        remove_path(&temp.path().join("missing")).unwrap();
    }

    #[test]
    fn test_exists_nofollow_sees_dangling_links() {
        let temp = TempDir::new().unwrap();
        let link = temp.path().join("dangling");
        symlink("/does/not/exist", &link).unwrap();
        assert!(!link.exists());
        assert!(exists_nofollow(&link));
    }

    #[test]
    fn test_rename_if_exists() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::write(&a, "x").unwrap();

        assert!(rename_if_exists(&a, &b).unwrap());
        assert!(!rename_if_exists(&a, &b).unwrap());
        assert_eq!(fs::read_to_string(&b).unwrap(), "x");
    }

    #[test]
    fn test_copy_tree_preserves_links_and_modes() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("bin")).unwrap();
        fs::write(src.join("bin/run"), "#!/bin/sh").unwrap();
        fs::set_permissions(src.join("bin/run"), fs::Permissions::from_mode(0o755)).unwrap();
        symlink("bin/run", src.join("run")).unwrap();

        let dest = temp.path().join("dest");
        copy_tree(&src, &dest).unwrap();

        assert_eq!(fs::read_link(dest.join("run")).unwrap(), Path::new("bin/run"));
        let mode = fs::metadata(dest.join("bin/run")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_rewrite_symlinks() {
        let temp = TempDir::new().unwrap();
        let scratch = temp.path().join("scratch");
        let tree = scratch.join("opt/mesosphere");
        fs::create_dir_all(tree.join("packages/mesos--1/bin")).unwrap();
        fs::create_dir_all(tree.join("bin")).unwrap();
        symlink(
            tree.join("packages/mesos--1/bin/mesos"),
            tree.join("bin/mesos"),
        )
        .unwrap();
        symlink("../lib/libfoo.so", tree.join("bin/relative")).unwrap();
        symlink("/usr/bin/env", tree.join("bin/env")).unwrap();

        let count = rewrite_symlinks(&scratch, &scratch, Path::new("/")).unwrap();

        assert_eq!(count, 1);
        assert_eq!(
            fs::read_link(tree.join("bin/mesos")).unwrap(),
            Path::new("/opt/mesosphere/packages/mesos--1/bin/mesos")
        );
        assert_eq!(fs::read_link(tree.join("bin/relative")).unwrap(), Path::new("../lib/libfoo.so"));
        assert_eq!(fs::read_link(tree.join("bin/env")).unwrap(), Path::new("/usr/bin/env"));
    }
}
