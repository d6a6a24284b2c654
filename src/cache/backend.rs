//! Cache Backend Contract
//!
//! The narrow interface the strategy engine requires of a physical cache.

use std::sync::Arc;

use crate::cache::{CachedEntry, Expiration};
use crate::error::CacheBackendError;

/// Bound satisfied by every type that can be stored through a strategy.
pub trait CacheValue: Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Sync + 'static {}

/// Result type of backend operations.
pub type BackendResult<T> = std::result::Result<T, CacheBackendError>;

// == Cache Backend ==
/// A physical cache the engine talks to, addressed by `(key, region)`.
///
/// Implementations must be safe to share between threads. The engine adds
/// no locking of its own around these calls, so concurrent writers to the
/// same key rely on the atomicity of `set`.
pub trait CacheBackend: Send + Sync {
    /// Returns the entry for `key`, or `None` if it is absent or expired.
    fn get<V: CacheValue>(&self, key: &str, region: &str) -> BackendResult<Option<CachedEntry<V>>>;

    /// Inserts (version 0) or updates in place (version + 1) the entry for `key`.
    fn set<V: CacheValue>(
        &self,
        key: &str,
        region: &str,
        value: V,
        expiration: &Expiration,
    ) -> BackendResult<CachedEntry<V>>;

    /// Removes the entry for `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str, region: &str) -> BackendResult<()>;

    /// Refreshes `last_validated_at` without touching value or version.
    /// Does nothing if the key is absent.
    fn mark_validated(&self, key: &str, region: &str) -> BackendResult<()>;
}

impl<B: CacheBackend> CacheBackend for Arc<B> {
    fn get<V: CacheValue>(&self, key: &str, region: &str) -> BackendResult<Option<CachedEntry<V>>> {
        (**self).get(key, region)
    }

    fn set<V: CacheValue>(
        &self,
        key: &str,
        region: &str,
        value: V,
        expiration: &Expiration,
    ) -> BackendResult<CachedEntry<V>> {
        (**self).set(key, region, value, expiration)
    }

    fn remove(&self, key: &str, region: &str) -> BackendResult<()> {
        (**self).remove(key, region)
    }

    fn mark_validated(&self, key: &str, region: &str) -> BackendResult<()> {
        (**self).mark_validated(key, region)
    }
}
