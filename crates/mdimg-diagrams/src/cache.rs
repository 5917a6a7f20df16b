//! Fingerprints and the artifact cache.
//!
//! [`DiagramKey`] hashes everything that affects the rendered bytes.
//! [`ArtifactCache`] maps those fingerprints to image files on disk, keeps the
//! index in memory for one build and optionally persists it through an
//! [`mdimg_cache::CacheBucket`] so later builds reuse existing images.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use mdimg_cache::{CacheBucket, CacheBucketExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::options::RenderOptions;

/// Diagram parameters for fingerprint computation.
#[derive(Debug)]
pub struct DiagramKey<'a> {
    /// Diagram source as authored.
    pub source: &'a str,
    /// Resolved render options for this block.
    pub options: &'a RenderOptions,
    /// Renderer-specific salt (mermaid config and CSS digest).
    pub salt: &'a str,
}

impl DiagramKey<'_> {
    /// Compute the hex-encoded SHA-256 fingerprint.
    ///
    /// Fields are length-prefixed so adjacent values cannot run into each
    /// other, and optional values carry a presence marker.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        let options = self.options;
        let mut hasher = Sha256::new();

        update_field(&mut hasher, Some(self.source));
        update_field(&mut hasher, Some(options.format.as_str()));
        update_field(&mut hasher, Some(options.theme.as_str()));
        update_field(&mut hasher, options.background.as_deref());
        update_field(&mut hasher, options.width.map(|w| w.to_string()).as_deref());
        update_field(&mut hasher, options.height.map(|h| h.to_string()).as_deref());
        update_field(&mut hasher, options.scale.map(|s| s.to_string()).as_deref());
        update_field(&mut hasher, Some(self.salt));

        hex::encode(hasher.finalize())
    }
}

fn update_field(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        Some(value) => {
            hasher.update([1u8]);
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        }
        None => hasher.update([0u8]),
    }
}

/// Persisted cache record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub artifact_path: PathBuf,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
}

/// Fingerprint to artifact index shared by all pages of a build.
///
/// Lookups verify that the artifact still exists and is non-empty; stale
/// entries are evicted and reported as misses. [`lock`](Self::lock) gives
/// per-fingerprint mutual exclusion so concurrent pages render a shared
/// diagram only once.
pub struct ArtifactCache {
    entries: Mutex<HashMap<String, PathBuf>>,
    persistent: Option<Box<dyn CacheBucket>>,
    in_flight: Mutex<HashSet<String>>,
    released: Condvar,
}

impl Default for ArtifactCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactCache {
    /// In-memory cache for a single build.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            persistent: None,
            in_flight: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    /// Cache backed by a persistent bucket in addition to memory.
    #[must_use]
    pub fn with_persistent(bucket: Box<dyn CacheBucket>) -> Self {
        Self {
            persistent: Some(bucket),
            ..Self::new()
        }
    }

    /// Artifact previously stored for `fingerprint`, if it is still usable.
    pub fn lookup(&self, fingerprint: &str) -> Option<PathBuf> {
        let mut entries = lock_ignoring_poison(&self.entries);
        if let Some(path) = entries.get(fingerprint) {
            if is_usable(path) {
                return Some(path.clone());
            }
            tracing::debug!(fingerprint, "evicting stale cache entry {}", path.display());
            entries.remove(fingerprint);
        }

        let bucket = self.persistent.as_ref()?;
        let entry = bucket.get_json::<CacheEntry>(fingerprint)?;
        if entry.fingerprint == fingerprint && is_usable(&entry.artifact_path) {
            entries.insert(fingerprint.to_owned(), entry.artifact_path.clone());
            return Some(entry.artifact_path);
        }
        tracing::debug!(
            fingerprint,
            "evicting stale persisted entry {}",
            entry.artifact_path.display()
        );
        bucket.remove(fingerprint);
        None
    }

    /// Record `path` as the artifact for `fingerprint`.
    pub fn store(&self, fingerprint: &str, path: &Path) {
        lock_ignoring_poison(&self.entries).insert(fingerprint.to_owned(), path.to_path_buf());
        if let Some(bucket) = &self.persistent {
            let created_at = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_secs());
            bucket.set_json(
                fingerprint,
                &CacheEntry {
                    fingerprint: fingerprint.to_owned(),
                    artifact_path: path.to_path_buf(),
                    created_at,
                },
            );
        }
    }

    /// Acquire exclusive rights to render `fingerprint`.
    ///
    /// Blocks while another thread holds the guard for the same fingerprint.
    /// Callers should repeat [`lookup`](Self::lookup) after acquiring it to
    /// reuse the previous holder's result.
    pub fn lock(&self, fingerprint: &str) -> FingerprintGuard<'_> {
        let mut in_flight = lock_ignoring_poison(&self.in_flight);
        while in_flight.contains(fingerprint) {
            in_flight = self
                .released
                .wait(in_flight)
                .unwrap_or_else(PoisonError::into_inner);
        }
        in_flight.insert(fingerprint.to_owned());

        FingerprintGuard {
            cache: self,
            fingerprint: fingerprint.to_owned(),
        }
    }
}

/// Exclusive render rights for one fingerprint, released on drop.
pub struct FingerprintGuard<'a> {
    cache: &'a ArtifactCache,
    fingerprint: String,
}

impl Drop for FingerprintGuard<'_> {
    fn drop(&mut self) {
        lock_ignoring_poison(&self.cache.in_flight).remove(&self.fingerprint);
        self.cache.released.notify_all();
    }
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn is_usable(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}
