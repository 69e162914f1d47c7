// src/filesystem/durable.rs

//! Durable state publication
//!
//! Every piece of state the swap protocol depends on goes through
//! [`publish_durably`]: write to a temporary name, fsync the file, rename it
//! over the final name, then fsync the parent directory so the rename itself
//! survives power loss. Temp and final must share a filesystem.

use crate::Result;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Atomically replace `final_path` with `contents`, staged through `temp_path`
pub fn publish_durably(temp_path: &Path, final_path: &Path, contents: &[u8]) -> Result<()> {
    {
        let mut file = File::create(temp_path)?;
        file.write_all(contents)?;
        file.flush()?;
        file.sync_all()?;
    }

    fs::rename(temp_path, final_path)?;
    sync_parent(final_path)?;

    debug!("Durably published {}", final_path.display());
    Ok(())
}

/// [`publish_durably`] for a serializable value, pretty-printed JSON
pub fn publish_json<T: Serialize>(temp_path: &Path, final_path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_vec_pretty(value)?;
    publish_durably(temp_path, final_path, &contents)
}

/// fsync the directory containing `path`
///
/// Directory fsync is required for rename durability on ext4/xfs; a
/// filesystem that cannot open directories for sync is tolerated.
pub fn sync_parent(path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if let Ok(dir) = File::open(parent) {
        dir.sync_all()?;
    }
    Ok(())
}
