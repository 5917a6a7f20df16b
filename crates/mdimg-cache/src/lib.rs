//! Persistent key/value cache for mdimg.
//!
//! The diagram pipeline keeps its fingerprint-to-artifact index in memory for
//! the duration of a build. This crate lets that index survive between builds
//! without tying the pipeline to a storage mechanism:
//!
//! - [`Cache`]: factory for named buckets
//! - [`CacheBucket`]: byte-oriented key/value store
//! - [`CacheBucketExt`]: JSON helpers available on every bucket
//!
//! # Implementations
//!
//! - [`NullCache`] / [`NullCacheBucket`]: persistence disabled, every lookup misses
//! - [`FileCache`]: one file per entry, wiped when the cache version changes
//!
//! # Example
//!
//! ```
//! use mdimg_cache::{Cache, NullCache};
//!
//! let cache = NullCache;
//! let bucket = cache.bucket("artifacts");
//! bucket.set("3f2a", b"{}");
//! assert_eq!(bucket.get("3f2a"), None);
//! ```

mod ext;
mod file;

pub use ext::CacheBucketExt;
pub use file::FileCache;

/// A named partition within a [`Cache`].
///
/// Operations never fail from the caller's point of view: a cache that cannot
/// be read behaves like an empty one, and a write that cannot be persisted is
/// dropped. Implementations log the underlying problem.
pub trait CacheBucket: Send + Sync {
    /// Retrieve the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &[u8]);

    /// Remove the value stored under `key`. Removing a missing key is a no-op.
    fn remove(&self, key: &str);
}

/// Factory for named [`CacheBucket`]s.
pub trait Cache: Send + Sync {
    /// Open or create a named bucket.
    ///
    /// Handles returned for the same name share the same underlying storage.
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket>;
}

/// [`CacheBucket`] that stores nothing.
pub struct NullCacheBucket;

impl CacheBucket for NullCacheBucket {
    fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    fn set(&self, _key: &str, _value: &[u8]) {}

    fn remove(&self, _key: &str) {}
}

/// [`Cache`] used when caching is disabled.
pub struct NullCache;

impl Cache for NullCache {
    fn bucket(&self, _name: &str) -> Box<dyn CacheBucket> {
        Box::new(NullCacheBucket)
    }
}
