//! Content-addressed disk store for tray icon images.
//!
//! Icons are written under a shared directory (the OS temp dir by default)
//! with filenames derived from the SHA-256 digest of their bytes. A file is
//! written at most once: storing identical bytes again only checks that the
//! file exists.
//!
//! Bytes are staged in a temporary file in the same directory and linked to
//! their digest name only once complete, so a digest-named file always holds
//! exactly the bytes it is named after.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Filename prefix for cached icons.
pub const FILE_PREFIX: &str = "systray_icon_";

/// Filename prefix of icons still being written.
const STAGING_PREFIX: &str = ".systray_icon_";

/// Errors from cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache directory not available")]
    NoCacheDir,
}

/// Result of storing icon bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredIcon {
    /// Location of the icon file on disk.
    pub path: PathBuf,
    /// Hex-encoded SHA-256 of the icon bytes.
    pub digest: String,
    /// `true` if this call wrote the file, `false` if it was already cached.
    pub created: bool,
}

/// Write-once icon store rooted at a single directory.
#[derive(Debug, Clone)]
pub struct IconCache {
    dir: PathBuf,
}

impl IconCache {
    /// Creates a cache rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates a cache in the OS temporary-files location.
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir())
    }

    /// Returns the directory icons are stored in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path an icon with the given digest is stored at.
    pub fn path_for(&self, digest: &str) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{digest}"))
    }

    /// Returns `true` if bytes with this digest are already on disk.
    pub fn contains(&self, digest: &str) -> bool {
        self.path_for(digest).is_file()
    }

    /// Stores icon bytes, skipping the write if the digest is already cached.
    pub fn store(&self, data: &[u8]) -> Result<StoredIcon, CacheError> {
        if self.dir.as_os_str().is_empty() {
            return Err(CacheError::NoCacheDir);
        }

        let digest = digest(data);
        let path = self.path_for(&digest);

        if path.is_file() {
            tracing::trace!(path = %path.display(), "icon already cached");
            return Ok(StoredIcon {
                path,
                digest,
                created: false,
            });
        }

        std::fs::create_dir_all(&self.dir)?;

        // A failed write drops the staging file, which deletes it.
        let mut staged = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(&self.dir)?;
        staged.write_all(data)?;
        staged.flush()?;

        // The loser of a race finds the winner's complete file in place.
        let created = match staged.persist_noclobber(&path) {
            Ok(_) => true,
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => false,
            Err(e) => return Err(e.error.into()),
        };

        tracing::debug!(path = %path.display(), created, "icon stored");
        Ok(StoredIcon {
            path,
            digest,
            created,
        })
    }
}

impl Default for IconCache {
    fn default() -> Self {
        Self::in_temp_dir()
    }
}

/// Hex-encoded SHA-256 digest of the given bytes (64 characters).
pub fn digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cache() -> (tempfile::TempDir, IconCache) {
        let tmp = tempfile::tempdir().unwrap();
        let cache = IconCache::new(tmp.path().join("icons"));
        (tmp, cache)
    }

    fn cached_files(cache: &IconCache) -> usize {
        std::fs::read_dir(cache.dir())
            .map(|entries| entries.flatten().count())
            .unwrap_or(0)
    }

    #[test]
    fn digest_deterministic() {
        assert_eq!(digest(b"icon-bytes"), digest(b"icon-bytes"));
    }

    #[test]
    fn digest_different_inputs() {
        assert_ne!(digest(b"icon-a"), digest(b"icon-b"));
    }

    #[test]
    fn digest_length() {
        assert_eq!(digest(b"x").len(), 64, "digest should be 64 hex chars");
    }

    #[test]
    fn store_creates_file_named_by_digest() {
        let (_tmp, cache) = test_cache();

        let stored = cache.store(b"fake-ico-data").unwrap();
        assert!(stored.created);
        assert_eq!(stored.digest, digest(b"fake-ico-data"));
        assert_eq!(stored.path, cache.path_for(&stored.digest));
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"fake-ico-data");
        assert!(
            stored
                .path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(FILE_PREFIX)
        );
    }

    #[test]
    fn store_identical_bytes_writes_once() {
        let (_tmp, cache) = test_cache();

        let first = cache.store(b"same").unwrap();
        let second = cache.store(b"same").unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.path, second.path);
        assert_eq!(cached_files(&cache), 1);
    }

    #[test]
    fn store_never_overwrites_existing_file() {
        let (_tmp, cache) = test_cache();

        let stored = cache.store(b"first-icon").unwrap();
        // Tamper with the file; a second store must leave it alone.
        std::fs::write(&stored.path, b"tampered").unwrap();

        let again = cache.store(b"first-icon").unwrap();
        assert!(!again.created);
        assert_eq!(std::fs::read(&again.path).unwrap(), b"tampered");
    }

    #[test]
    fn concurrent_stores_only_return_complete_files() {
        let (_tmp, cache) = test_cache();
        let data: Vec<u8> = (0..8 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        let data = std::sync::Arc::new(data);
        let barrier = std::sync::Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let data = std::sync::Arc::clone(&data);
                let barrier = std::sync::Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let stored = cache.store(&data).unwrap();
                    let len = std::fs::metadata(&stored.path).unwrap().len();
                    (stored.created, len)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let created = results.iter().filter(|(created, _)| *created).count();
        assert_eq!(created, 1, "exactly one store should write the file");
        for (_, len) in &results {
            assert_eq!(*len, data.len() as u64, "store returned a partial file");
        }
        assert_eq!(std::fs::read(cache.path_for(&digest(&data))).unwrap(), *data);
        assert_eq!(cached_files(&cache), 1, "staging files are cleaned up");
    }

    #[test]
    fn store_distinct_bytes_writes_distinct_files() {
        let (_tmp, cache) = test_cache();

        cache.store(b"one").unwrap();
        cache.store(b"two").unwrap();
        assert_eq!(cached_files(&cache), 2);
    }

    #[test]
    fn contains_reflects_store() {
        let (_tmp, cache) = test_cache();
        let d = digest(b"icon");

        assert!(!cache.contains(&d));
        cache.store(b"icon").unwrap();
        assert!(cache.contains(&d));
    }

    #[test]
    fn empty_dir_is_rejected() {
        let cache = IconCache::new("");
        assert!(matches!(cache.store(b"x"), Err(CacheError::NoCacheDir)));
    }
}
