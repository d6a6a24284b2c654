//! Typed Cache Strategy
//!
//! A strategy bound to a value type, with synchronous validation and
//! retrieval callbacks.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cache::{CacheBackend, CacheValue, CachedEntry, ValidationResult};
use crate::error::{BoxError, Result};
use crate::strategy::callbacks::boxed_retrieve;
use crate::strategy::{AsyncCallbacks, CacheStrategyAsync, Callbacks, RetrievalErrorResult, StrategyTarget};

/// A cacheable operation producing values of type `V`.
///
/// Without a retrieval callback the strategy is read-only: an unusable entry
/// is removed and `get` yields `None`.
pub struct CacheStrategy<B, V> {
    pub(crate) target: StrategyTarget<B>,
    pub(crate) callbacks: Callbacks<V>,
}

impl<B, V> Clone for CacheStrategy<B, V> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            callbacks: self.callbacks.clone(),
        }
    }
}

impl<B: CacheBackend, V: CacheValue> CacheStrategy<B, V> {
    pub(crate) fn new(target: StrategyTarget<B>) -> Self {
        Self {
            target,
            callbacks: Callbacks::default(),
        }
    }

    key_builders!();

    /// Sets the callback that decides whether a cached entry is still usable.
    pub fn validate<F>(mut self, validate: F) -> Self
    where
        F: Fn(&CachedEntry<V>) -> ValidationResult + Send + Sync + 'static,
    {
        self.callbacks.validate = Some(Arc::new(validate));
        self
    }

    /// Treats the cached entry as invalid whenever `predicate` returns true,
    /// and as valid otherwise.
    pub fn invalidate_if<F>(self, predicate: F) -> Self
    where
        F: Fn(&CachedEntry<V>) -> bool + Send + Sync + 'static,
    {
        self.validate(move |entry| {
            if predicate(entry) {
                ValidationResult::Invalid
            } else {
                ValidationResult::Valid
            }
        })
    }

    /// Keeps a cached entry only if it was cached strictly after `after`;
    /// entries cached at or before `after` are recomputed.
    pub fn validate_cached_after(self, after: DateTime<Utc>) -> Self {
        self.invalidate_if(move |entry| entry.cached_at <= after)
    }

    /// Sets the callback that computes a fresh value on a miss.
    pub fn retrieve_using<F>(mut self, retrieve: F) -> Self
    where
        F: Fn() -> std::result::Result<V, BoxError> + Send + Sync + 'static,
    {
        self.callbacks.retrieve = Some(Arc::new(retrieve));
        self
    }

    /// Switches to an asynchronous retrieval callback.
    ///
    /// The validation and retrieval-failure callbacks carry over.
    pub fn retrieve_using_async<F, Fut>(self, retrieve: F) -> CacheStrategyAsync<B, V>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<V, BoxError>> + Send + 'static,
    {
        let mut callbacks = AsyncCallbacks::from_sync(self.callbacks);
        callbacks.retrieve = Some(boxed_retrieve(retrieve));
        CacheStrategyAsync::from_parts(self.target, callbacks)
    }

    /// Sets the callback consulted when retrieval fails.
    pub fn on_retrieval_failure<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&BoxError, Option<&CachedEntry<V>>) -> RetrievalErrorResult<V> + Send + Sync + 'static,
    {
        self.callbacks.on_retrieval_error = Some(Arc::new(on_error));
        self
    }

    // == Terminal Operations ==

    /// Runs the cache protocol and returns the resulting entry, if any.
    pub fn get(&self) -> Result<Option<CachedEntry<V>>> {
        let key = self.target.key();
        self.target.cache.execute(
            &key,
            self.target.region(),
            self.target.expiration,
            &self.callbacks,
        )
    }

    /// Like [`CacheStrategy::get`], returning `V::default()` when no entry resulted.
    pub fn get_value(&self) -> Result<V>
    where
        V: Default,
    {
        Ok(self.get()?.map(CachedEntry::into_value).unwrap_or_default())
    }

    /// Runs the protocol on the async path. The callbacks stay synchronous.
    pub async fn get_async(&self) -> Result<Option<CachedEntry<V>>> {
        let key = self.target.key();
        let callbacks = AsyncCallbacks::from_sync(self.callbacks.clone());
        self.target
            .cache
            .execute_async(&key, self.target.region(), self.target.expiration, &callbacks)
            .await
    }

    pub async fn get_value_async(&self) -> Result<V>
    where
        V: Default,
    {
        Ok(self
            .get_async()
            .await?
            .map(CachedEntry::into_value)
            .unwrap_or_default())
    }

    /// Writes `value` under this strategy's key, bypassing validation.
    pub fn set_value(&self, value: V) -> Result<CachedEntry<V>> {
        let key = self.target.key();
        self.target
            .cache
            .write(&key, self.target.region(), value, &self.target.expiration)
    }

    /// Removes the cached entry.
    pub fn clear(&self) -> Result<()> {
        let key = self.target.key();
        self.target.cache.delete(&key, self.target.region())
    }
}
