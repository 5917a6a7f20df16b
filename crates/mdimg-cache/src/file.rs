//! File-based cache implementation.
//!
//! [`FileCache`] keeps one file per entry, grouped into one directory per
//! bucket:
//!
//! ```text
//! {root}/
//! +-- VERSION          # cache layout version
//! +-- artifacts/       # bucket "artifacts"
//!     +-- 3f2a9c...    # entry, file name is the key
//! ```
//!
//! Writes go through a temporary file in the bucket directory that is renamed
//! over the entry, so concurrent readers never observe a half-written value.
//! Keys are restricted to `[A-Za-z0-9_.-]` and may not start with a dot, which
//! keeps every entry inside its bucket directory.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::{Cache, CacheBucket};

/// File-based [`Cache`] rooted at a directory on disk.
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Open the cache at `root`.
    ///
    /// When the `VERSION` file does not contain `version`, the directory is
    /// wiped and re-initialised. Problems are logged, never returned: a cache
    /// that cannot be initialised simply misses.
    #[must_use]
    pub fn new(root: PathBuf, version: &str) -> Self {
        ensure_version(&root, version);
        Self { root }
    }

    /// Root directory of this cache.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Cache for FileCache {
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket> {
        Box::new(FileCacheBucket {
            dir: self.root.join(name),
        })
    }
}

struct FileCacheBucket {
    dir: PathBuf,
}

impl FileCacheBucket {
    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        if is_valid_key(key) {
            Some(self.dir.join(key))
        } else {
            tracing::debug!(key, "rejecting cache key");
            None
        }
    }

    fn write_atomic(&self, path: &Path, value: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl CacheBucket for FileCacheBucket {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.entry_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!("failed to read cache entry {}: {e}", path.display());
                None
            }
        }
    }

    fn set(&self, key: &str, value: &[u8]) {
        let Some(path) = self.entry_path(key) else {
            return;
        };
        if let Err(e) = self.write_atomic(&path, value) {
            tracing::warn!("failed to write cache entry {}: {e}", path.display());
        }
    }

    fn remove(&self, key: &str) {
        let Some(path) = self.entry_path(key) else {
            return;
        };
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("failed to remove cache entry {}: {e}", path.display()),
        }
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

/// Make sure `root` holds a cache of the given version, wiping it otherwise.
fn ensure_version(root: &Path, version: &str) {
    let version_file = root.join("VERSION");

    match fs::read_to_string(&version_file) {
        Ok(stored) if stored.trim() == version => {
            tracing::debug!("cache version {version} is current");
            return;
        }
        Ok(stored) => tracing::info!(
            "cache version changed ({} -> {version}), clearing {}",
            stored.trim(),
            root.display()
        ),
        Err(_) => tracing::debug!("initializing cache at {}", root.display()),
    }

    if root.exists()
        && let Err(e) = fs::remove_dir_all(root)
    {
        tracing::warn!("failed to clear cache directory {}: {e}", root.display());
    }
    if let Err(e) = fs::create_dir_all(root) {
        tracing::warn!("failed to create cache directory {}: {e}", root.display());
        return;
    }
    if let Err(e) = fs::write(&version_file, version) {
        tracing::warn!("failed to write {}: {e}", version_file.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(tmp: &TempDir) -> FileCache {
        FileCache::new(tmp.path().join("cache"), "v1")
    }

    #[test]
    fn test_set_get_remove() {
        let tmp = TempDir::new().unwrap();
        let bucket = open(&tmp).bucket("artifacts");

        bucket.set("abc123", b"payload");
        assert_eq!(bucket.get("abc123"), Some(b"payload".to_vec()));

        bucket.remove("abc123");
        assert_eq!(bucket.get("abc123"), None);

        // Second remove is a no-op
        bucket.remove("abc123");
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let tmp = TempDir::new().unwrap();
        let bucket = open(&tmp).bucket("artifacts");

        bucket.set("key", b"first");
        bucket.set("key", b"second");

        assert_eq!(bucket.get("key"), Some(b"second".to_vec()));
    }

    #[test]
    fn test_buckets_are_isolated() {
        let tmp = TempDir::new().unwrap();
        let cache = open(&tmp);
        let a = cache.bucket("alpha");
        let b = cache.bucket("beta");

        a.set("key", b"alpha-data");
        b.set("key", b"beta-data");

        assert_eq!(a.get("key"), Some(b"alpha-data".to_vec()));
        assert_eq!(b.get("key"), Some(b"beta-data".to_vec()));
    }

    #[test]
    fn test_invalid_keys_never_touch_disk() {
        let tmp = TempDir::new().unwrap();
        let cache = open(&tmp);
        let bucket = cache.bucket("artifacts");

        for key in ["", "../escape", ".hidden", "a/b", "white space"] {
            bucket.set(key, b"data");
            assert_eq!(bucket.get(key), None, "key {key:?} should be rejected");
        }
        assert!(!tmp.path().join("escape").exists());
    }

    #[test]
    fn test_no_temporary_files_left_behind() {
        let tmp = TempDir::new().unwrap();
        let cache = open(&tmp);
        let bucket = cache.bucket("artifacts");

        bucket.set("one", b"1");
        bucket.set("two", b"2");

        let mut names: Vec<_> = fs::read_dir(cache.root().join("artifacts"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["one", "two"]);
    }

    #[test]
    fn test_same_version_keeps_entries() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");

        FileCache::new(root.clone(), "v1")
            .bucket("artifacts")
            .set("key", b"kept");

        let reopened = FileCache::new(root, "v1");
        assert_eq!(reopened.bucket("artifacts").get("key"), Some(b"kept".to_vec()));
    }

    #[test]
    fn test_version_change_wipes_entries() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");

        FileCache::new(root.clone(), "v1")
            .bucket("artifacts")
            .set("key", b"stale");

        let reopened = FileCache::new(root.clone(), "v2");
        assert_eq!(reopened.bucket("artifacts").get("key"), None);
        assert_eq!(fs::read_to_string(root.join("VERSION")).unwrap(), "v2");
    }

    #[test]
    fn test_missing_version_file_initializes_nested_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("deeply/nested/cache");

        let _cache = FileCache::new(root.clone(), "v1");

        assert_eq!(fs::read_to_string(root.join("VERSION")).unwrap(), "v1");
    }
}
