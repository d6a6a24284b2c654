//! Asynchronous Cache Strategy
//!
//! Same protocol as [`CacheStrategy`](crate::strategy::CacheStrategy), with
//! validation and retrieval callbacks that may suspend.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cache::{CacheBackend, CacheValue, CachedEntry, ValidationResult};
use crate::error::{BoxError, Result};
use crate::strategy::callbacks::{boxed_retrieve, boxed_validate, lift_validate};
use crate::strategy::{AsyncCallbacks, RetrievalErrorResult, StrategyTarget};

/// A cacheable operation producing values of type `V` asynchronously.
pub struct CacheStrategyAsync<B, V> {
    pub(crate) target: StrategyTarget<B>,
    pub(crate) callbacks: AsyncCallbacks<V>,
}

impl<B, V> Clone for CacheStrategyAsync<B, V> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            callbacks: self.callbacks.clone(),
        }
    }
}

impl<B: CacheBackend, V: CacheValue> CacheStrategyAsync<B, V> {
    pub(crate) fn from_parts(target: StrategyTarget<B>, callbacks: AsyncCallbacks<V>) -> Self {
        Self { target, callbacks }
    }

    key_builders!();

    /// Sets a synchronous validation callback.
    pub fn validate<F>(mut self, validate: F) -> Self
    where
        F: Fn(&CachedEntry<V>) -> ValidationResult + Send + Sync + 'static,
    {
        self.callbacks.validate = Some(lift_validate(Arc::new(validate)));
        self
    }

    /// Sets a validation callback that may suspend.
    pub fn validate_async<F, Fut>(mut self, validate: F) -> Self
    where
        F: Fn(CachedEntry<V>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ValidationResult> + Send + 'static,
    {
        self.callbacks.validate = Some(boxed_validate(validate));
        self
    }

    /// Invalid when `predicate` returns true, valid otherwise.
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

    /// Async predicate form of [`CacheStrategyAsync::invalidate_if`].
    pub fn invalidate_if_async<F, Fut>(self, predicate: F) -> Self
    where
        F: Fn(CachedEntry<V>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.validate_async(move |entry| {
            let invalid = predicate(entry);
            async move {
                if invalid.await {
                    ValidationResult::Invalid
                } else {
                    ValidationResult::Valid
                }
            }
        })
    }

    /// Replaces the retrieval callback.
    pub fn retrieve_using_async<F, Fut>(mut self, retrieve: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<V, BoxError>> + Send + 'static,
    {
        self.callbacks.retrieve = Some(boxed_retrieve(retrieve));
        self
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

    pub async fn get_async(&self) -> Result<Option<CachedEntry<V>>> {
        let key = self.target.key();
        self.target
            .cache
            .execute_async(&key, self.target.region(), self.target.expiration, &self.callbacks)
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

    pub fn set_value(&self, value: V) -> Result<CachedEntry<V>> {
        let key = self.target.key();
        self.target
            .cache
            .write(&key, self.target.region(), value, &self.target.expiration)
    }

    pub fn clear(&self) -> Result<()> {
        let key = self.target.key();
        self.target.cache.delete(&key, self.target.region())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBackend;
    use crate::client::StrategyCache;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_async_retrieval_then_reuse() {
        let cache = StrategyCache::new(MemoryBackend::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let strategy = cache.with_key("Download").retrieve_using_async(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok("payload".to_string())
            }
        });

        let first = strategy.get_async().await.unwrap().unwrap();
        let second = strategy.get_async().await.unwrap().unwrap();

        assert_eq!(first.value, "payload");
        assert_eq!(second.version, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_if_async_recomputes() {
        let cache = StrategyCache::new(MemoryBackend::new());
        let strategy = cache
            .with_key("Counter")
            .retrieve_using_async(|| async { Ok(1_u32) });
        strategy.get_async().await.unwrap();

        let entry = strategy
            .invalidate_if_async(|entry| async move { entry.value == 1 })
            .get_async()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(entry.version, 1);
    }

    #[tokio::test]
    async fn test_validate_cached_after_both_directions() {
        let cache = StrategyCache::new(MemoryBackend::new());
        let strategy = cache
            .with_key("Feed")
            .retrieve_using_async(|| async { Ok(5_u8) });
        let first = strategy.get_async().await.unwrap().unwrap();

        let kept = strategy
            .clone()
            .validate_cached_after(first.cached_at - chrono::Duration::seconds(1))
            .get_async()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.version, 0);

        let refreshed = strategy
            .validate_cached_after(Utc::now())
            .get_async()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed.version, 1);
    }

    #[tokio::test]
    async fn test_async_retrieval_error_propagates() {
        let cache = StrategyCache::new(MemoryBackend::new());
        let strategy = cache
            .with_key("Broken")
            .retrieve_using_async(|| async { Err::<u32, BoxError>("timeout".into()) });

        let err = strategy.get_async().await.unwrap_err();

        assert_eq!(err.to_string(), "timeout");
        assert!(strategy.get_value_async().await.is_err());
    }

    #[tokio::test]
    async fn test_sync_callbacks_carry_over() {
        let cache = StrategyCache::new(MemoryBackend::new());
        let strategy = cache
            .with_key("Carry")
            .complete::<i64>()
            .invalidate_if(|_| true)
            .retrieve_using_async(|| async { Ok(3) });

        strategy.set_value(1).unwrap();
        let entry = strategy.get_async().await.unwrap().unwrap();

        assert_eq!(entry.value, 3);
        assert_eq!(entry.version, 1);
    }
}
