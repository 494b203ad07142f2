use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Digest rendered for a file that does not exist.
const MISSING_DIGEST: &str = "-";

/// Compute the SHA-256 hex digest of some bytes.
pub fn hash(content: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_ref());
    format!("{:x}", hasher.finalize())
}

/// Hash a set of files for change detection.
///
/// Paths are de-duplicated and sorted, each one is rendered as
/// `"<digest> <path>"` with the path relative to `base_dir` when it lies below
/// it, and the newline-joined listing is hashed again. The result only depends
/// on the set of (relative path, content) pairs.
pub fn hash_file_set<P: AsRef<Path>>(paths: &[P], base_dir: &Path) -> String {
    let unique: BTreeSet<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();

    let lines: Vec<String> = unique
        .iter()
        .map(|path| {
            let digest = match std::fs::read(path) {
                Ok(content) => hash(content),
                Err(_) => MISSING_DIGEST.to_string(),
            };
            let shown = path.strip_prefix(base_dir).unwrap_or(path);
            format!("{digest} {}", shown.to_string_lossy().replace('\\', "/"))
        })
        .collect();

    hash(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(hash("hello world"), hash(b"hello world"));
        assert_ne!(hash("hello"), hash("world"));
        assert_eq!(
            hash("hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_hash_file_set_order_and_duplicate_independent() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "alpha").unwrap();
        std::fs::write(&b, "beta").unwrap();

        let ab = hash_file_set(&[a.clone(), b.clone()], dir.path());
        let ba = hash_file_set(&[b.clone(), a.clone()], dir.path());
        let dup = hash_file_set(&[a.clone(), b.clone(), a.clone(), b.clone()], dir.path());
        assert_eq!(ab, ba);
        assert_eq!(ab, dup);
        assert_ne!(ab, hash_file_set(&[a.clone()], dir.path()));
    }

    #[test]
    fn test_hash_file_set_relative_to_base() {
        let one = tempfile::tempdir().unwrap();
        let two = tempfile::tempdir().unwrap();
        std::fs::write(one.path().join("x.py"), "x = 1").unwrap();
        std::fs::write(two.path().join("x.py"), "x = 1").unwrap();

        assert_eq!(
            hash_file_set(&[one.path().join("x.py")], one.path()),
            hash_file_set(&[two.path().join("x.py")], two.path()),
        );
    }

    #[test]
    fn test_hash_file_set_missing_file_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.xml");
        let expected = hash(format!("{MISSING_DIGEST} gone.xml"));
        assert_eq!(hash_file_set(&[missing], dir.path()), expected);
    }

    #[test]
    fn test_hash_file_set_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        std::fs::write(&a, "one").unwrap();
        let before = hash_file_set(&[a.clone()], dir.path());
        std::fs::write(&a, "two").unwrap();
        assert_ne!(before, hash_file_set(&[a], dir.path()));
    }
}
