// src/filesystem/merge.rs

//! Symlink-tree merge
//!
//! Mirrors a package's contribution into a shared generation directory.
//! Files and symlinks become symlinks pointing back into the package; real
//! directories become real directories so several packages can each add
//! entries under e.g. `bin/`. A destination that is already a symlink is
//! owned by a single earlier package and never receives a second
//! contributor.

use crate::{Error, Result};
use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::Path;
use tracing::trace;

/// Merge the tree at `src` into `dest`
///
/// `dest` must already exist as a real directory. Entries are processed in
/// sorted order so conflict reports are deterministic.
pub fn symlink_tree(src: &Path, dest: &Path) -> Result<()> {
    let mut entries = fs::read_dir(src)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());
        // DirEntry::file_type does not follow symlinks
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            merge_directory(&src_path, &dest_path)?;
        } else {
            link_entry(&src_path, &dest_path)?;
        }
    }

    Ok(())
}

fn merge_directory(src_path: &Path, dest_path: &Path) -> Result<()> {
    match fs::symlink_metadata(dest_path) {
        Ok(meta) if meta.file_type().is_dir() => {}
        Ok(_) => {
            return Err(Error::MergeConflict {
                src: src_path.to_path_buf(),
                dest: dest_path.to_path_buf(),
            });
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir(dest_path)?;
        }
        Err(e) => return Err(e.into()),
    }

    symlink_tree(src_path, dest_path)
}

fn link_entry(src_path: &Path, dest_path: &Path) -> Result<()> {
    match symlink(src_path, dest_path) {
        Ok(()) => {
            trace!("{} -> {}", dest_path.display(), src_path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(Error::MergeConflict {
            src: src_path.to_path_buf(),
            dest: dest_path.to_path_buf(),
        }),
        Err(e) => Err(e.into()),
    }
}
