// src/repository/archive.rs

//! Package tarballs
//!
//! Extraction picks a decoder from the file extension. Creation always
//! writes xz with deterministic headers and sorted entries, so packing the
//! same tree twice yields byte-identical archives.

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Component, Path};
use tar::{Archive, Builder, HeaderMode};
use tracing::debug;
use walkdir::WalkDir;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

/// Compression of a tarball, derived from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarballFormat {
    Xz,
    Gzip,
    Plain,
}

impl TarballFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy();
        if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::Xz)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::Gzip)
        } else if name.ends_with(".tar") {
            Some(Self::Plain)
        } else {
            None
        }
    }
}

fn open_archive(path: &Path) -> Result<Archive<Box<dyn Read>>> {
    let format = TarballFormat::from_path(path).ok_or_else(|| {
        Error::Unsupported(format!(
            "Unknown archive type for {}; expected .tar.xz, .tar.gz, .tgz or .tar",
            path.display()
        ))
    })?;

    let file = BufReader::new(File::open(path)?);
    let reader: Box<dyn Read> = match format {
        TarballFormat::Xz => Box::new(XzDecoder::new(file)),
        TarballFormat::Gzip => Box::new(GzDecoder::new(file)),
        TarballFormat::Plain => Box::new(file),
    };

    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    Ok(archive)
}

/// Unpack `archive_path` into `dest`, creating it if needed
pub fn extract_tarball(archive_path: &Path, dest: &Path) -> Result<()> {
    debug!("Extracting {} into {}", archive_path.display(), dest.display());
    fs::create_dir_all(dest)?;
    let mut archive = open_archive(archive_path)?;
    archive.unpack(dest).map_err(|e| {
        Error::IoError(format!("Failed to extract {}: {}", archive_path.display(), e))
    })
}

/// Unpack `archive_path` into `dest`, dropping the first path component
///
/// Source tarballs conventionally wrap everything in one top-level
/// directory; entries that would escape `dest` are rejected.
pub fn extract_stripped(archive_path: &Path, dest: &Path) -> Result<()> {
    debug!(
        "Extracting {} into {} (stripping top-level directory)",
        archive_path.display(),
        dest.display()
    );
    fs::create_dir_all(dest)?;
    let mut archive = open_archive(archive_path)?;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();

        let mut components = path.components();
        components.next();
        let stripped = components.as_path();
        if stripped.as_os_str().is_empty() {
            continue;
        }
        if stripped
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(Error::IoError(format!(
                "Refusing to extract {} from {}: path escapes the destination",
                path.display(),
                archive_path.display()
            )));
        }

        let target = dest.join(stripped);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
    }

    Ok(())
}

/// Pack the contents of `src_dir` into an xz tarball at `out`
///
/// Entries are stored relative to `src_dir` in sorted order with
/// deterministic headers (fixed mtime and ownership). Symlinks are stored as
/// links. The archive is written to `<out>.tmp` and renamed into place.
pub fn create_tarball(src_dir: &Path, out: &Path) -> Result<()> {
    let tmp = out.with_extension("tmp");
    {
        let file = BufWriter::new(File::create(&tmp)?);
        let encoder = XzEncoder::new(file, 6);
        let mut builder = Builder::new(encoder);
        builder.mode(HeaderMode::Deterministic);
        builder.follow_symlinks(false);

        for entry in WalkDir::new(src_dir).min_depth(1).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(io::Error::other)?;
            let relative = entry.path().strip_prefix(src_dir).map_err(io::Error::other)?;
            if entry.file_type().is_dir() {
                builder.append_dir(relative, entry.path())?;
            } else {
                builder.append_path_with_name(entry.path(), relative)?;
            }
        }

        let encoder = builder.into_inner()?;
        let mut file = encoder.finish()?;
        io::Write::flush(&mut file)?;
    }
    fs::rename(&tmp, out)?;

    debug!("Packed {} into {}", src_dir.display(), out.display());
    Ok(())
}
