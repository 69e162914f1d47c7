// src/hash.rs

//! SHA-256 helpers for content identification
//!
//! Used for verifying downloaded sources, fingerprinting build scripts and
//! computing tree digests of local source directories. All digests are
//! lowercase hex strings.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use walkdir::WalkDir;

/// Length of a hex encoded SHA-256 digest
pub const HEX_LEN: usize = 64;

/// Hash a byte slice
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash a UTF-8 string
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Hash data from a reader without buffering it all in memory
pub fn hash_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash the contents of a file
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    hash_reader(&mut file)
}

/// Digest of every regular file under `dir`
///
/// Files are visited in sorted path order and each contributes
/// `<relative path>\0<content hash>\n`, so the digest changes when a file is
/// renamed, added, removed or edited, but not when mtimes or inode order do.
pub fn hash_tree(dir: &Path) -> io::Result<String> {
    let mut manifest = String::new();
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(io::Error::other)?;
        manifest.push_str(&relative.to_string_lossy());
        manifest.push('\0');
        manifest.push_str(&hash_file(entry.path())?);
        manifest.push('\n');
    }
    Ok(hash_str(&manifest))
}

/// Check that a string looks like a hex SHA-256 digest
pub fn is_sha256(s: &str) -> bool {
    s.len() == HEX_LEN && s.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_hash_bytes_known_value() {
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_file_matches_bytes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data");
        fs::write(&path, b"hello world").unwrap();

        assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"hello world"));
    }

    #[test]
    fn test_hash_tree_sensitive_to_names_and_content() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("tree");
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("a"), "1").unwrap();
        fs::write(dir.join("sub/b"), "2").unwrap();

        let first = hash_tree(&dir).unwrap();
        assert_eq!(first, hash_tree(&dir).unwrap());

        fs::write(dir.join("sub/b"), "3").unwrap();
        let edited = hash_tree(&dir).unwrap();
        assert_ne!(first, edited);

        fs::rename(dir.join("a"), dir.join("c")).unwrap();
        assert_ne!(edited, hash_tree(&dir).unwrap());
    }

    #[test]
    fn test_is_sha256() {
        assert!(is_sha256(&hash_str("x")));
        assert!(!is_sha256("abc"));
        assert!(!is_sha256(&"z".repeat(HEX_LEN)));
    }
}
