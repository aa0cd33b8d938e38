//! Content hashing
//!
//! Change detection is keyed on file bytes only, never on timestamps, so
//! identical bytes always hash identically.

use sha2::{Digest, Sha256};
use std::{fs, io, path::Path};

/// SHA-256 of `bytes`, hex encoded
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn hash_source(source: &str) -> String {
    hash_bytes(source.as_bytes())
}

/// Read `path` and hash its contents
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(hash_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_hash_is_hex_sha256() {
        assert_eq!(
            hash_source(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(hash_source("def f\nend\n").len(), 64);
    }

    #[test]
    fn test_one_byte_changes_hash() {
        assert_ne!(hash_source("def f\nend\n"), hash_source("def g\nend\n"));
        assert_eq!(hash_source("same"), hash_bytes(b"same"));
    }

    #[test]
    fn test_hash_file_ignores_timestamps() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"type Id = Integer\n").unwrap();
        let before = hash_file(file.path()).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        std::fs::write(file.path(), b"type Id = Integer\n").unwrap();
        assert_eq!(hash_file(file.path()).unwrap(), before);
    }
}
