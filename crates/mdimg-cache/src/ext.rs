//! Typed helpers for [`CacheBucket`].

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::CacheBucket;

/// JSON convenience methods for any [`CacheBucket`].
///
/// Kept on an extension trait so [`CacheBucket`] stays object-safe and
/// implementors only deal with bytes.
///
/// ```
/// use mdimg_cache::{Cache, CacheBucketExt, NullCache};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Entry { path: String }
///
/// let bucket = NullCache.bucket("artifacts");
/// bucket.set_json("abc", &Entry { path: "a.svg".into() });
/// let entry: Option<Entry> = bucket.get_json("abc");
/// assert!(entry.is_none());
/// ```
pub trait CacheBucketExt: CacheBucket {
    /// Retrieve and deserialize a JSON value.
    ///
    /// Returns `None` on a miss or when the stored bytes do not deserialize
    /// into `T` (for example after a schema change).
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(key, "ignoring undecodable cache entry: {e}");
                None
            }
        }
    }

    /// Serialize `value` as JSON and store it.
    fn set_json<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.set(key, &bytes),
            Err(e) => tracing::warn!(key, "failed to serialize cache entry: {e}"),
        }
    }
}

impl<B: CacheBucket + ?Sized> CacheBucketExt for B {}
