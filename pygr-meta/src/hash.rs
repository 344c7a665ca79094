//! Deterministic hashing for derivations and source trees
//!
//! `fingerprint` hashes a structured value through its canonical JSON form;
//! `tree_hash` hashes a checked-out source tree by walking it in a fixed
//! order. Both produce lowercase 64-hex SHA-256 digests.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::Result;

/// Hash a structured value via canonical JSON.
///
/// serde_json maps are BTreeMap-backed, so object keys serialize in
/// lexicographic order and the compact encoding is byte-stable: equal values
/// hash equally regardless of how their maps were built.
pub fn fingerprint(value: &serde_json::Value) -> String {
    let canonical = value.to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)
}

/// Hash a directory tree deterministically.
///
/// At each directory, files are visited first (sorted by name), then
/// subdirectories (sorted by name); `.git` subtrees are excluded. Each file
/// feeds its root-relative path and then its full content into one running
/// hash, so the digest pins both layout and bytes.
pub fn tree_hash(dir: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    hash_dir(dir, dir, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn hash_dir(root: &Path, dir: &Path, hasher: &mut Sha256) -> Result<()> {
    let mut files = Vec::new();
    let mut subdirs = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            if path.file_name().map(|n| n == ".git").unwrap_or(false) {
                continue;
            }
            subdirs.push(path);
        } else {
            files.push(path);
        }
    }

    files.sort();
    subdirs.sort();

    for file in files {
        let rel = file.strip_prefix(root).unwrap_or(&file);
        hasher.update(rel.to_string_lossy().as_bytes());
        hash_file_contents(&file, hasher)?;
    }

    for subdir in subdirs {
        hash_dir(root, &subdir, hasher)?;
    }

    Ok(())
}

fn hash_file_contents(path: &Path, hasher: &mut Sha256) -> Result<()> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut buffer = [0u8; 65536];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(())
}
