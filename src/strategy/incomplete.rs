//! Incomplete Cache Strategy
//!
//! Key material without a value type. Attaching a retrieval callback, or
//! naming the value type, turns it into a typed strategy.

use std::future::Future;

use crate::cache::{CacheBackend, CacheValue, CachedEntry};
use crate::error::{BoxError, Result};
use crate::strategy::{CacheStrategy, CacheStrategyAsync, StrategyTarget};

pub struct CacheStrategyIncomplete<B> {
    pub(crate) target: StrategyTarget<B>,
}

impl<B> Clone for CacheStrategyIncomplete<B> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
        }
    }
}

impl<B: CacheBackend> CacheStrategyIncomplete<B> {
    pub(crate) fn new(target: StrategyTarget<B>) -> Self {
        Self { target }
    }

    key_builders!();

    /// Binds the value type without a retrieval callback (read-only).
    pub fn complete<V: CacheValue>(self) -> CacheStrategy<B, V> {
        CacheStrategy::new(self.target)
    }

    pub fn retrieve_using<V, F>(self, retrieve: F) -> CacheStrategy<B, V>
    where
        V: CacheValue,
        F: Fn() -> std::result::Result<V, BoxError> + Send + Sync + 'static,
    {
        self.complete().retrieve_using(retrieve)
    }

    pub fn retrieve_using_async<V, F, Fut>(self, retrieve: F) -> CacheStrategyAsync<B, V>
    where
        V: CacheValue,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<V, BoxError>> + Send + 'static,
    {
        self.complete().retrieve_using_async(retrieve)
    }

    /// Reads the cached entry as `V`, trusting whatever is there.
    pub fn get<V: CacheValue>(&self) -> Result<Option<CachedEntry<V>>> {
        self.clone().complete::<V>().get()
    }

    pub fn get_value<V: CacheValue + Default>(&self) -> Result<V> {
        self.clone().complete::<V>().get_value()
    }

    pub fn set_value<V: CacheValue>(&self, value: V) -> Result<CachedEntry<V>> {
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
    use crate::cache::MemoryBackend;
    use crate::client::StrategyCache;
    use crate::keys::CallDescriptor;

    #[test]
    fn test_read_without_retrieval() {
        let cache = StrategyCache::new(MemoryBackend::new());
        let strategy = cache.with_key("Greeting");

        assert!(strategy.get::<String>().unwrap().is_none());

        strategy.set_value("hello".to_string()).unwrap();
        assert_eq!(strategy.get_value::<String>().unwrap(), "hello");
    }

    #[test]
    fn test_clear_removes_value() {
        let cache = StrategyCache::new(MemoryBackend::new());
        let strategy = cache.with_key("Temp");
        strategy.set_value(1_u8).unwrap();

        strategy.clear().unwrap();
        strategy.clear().unwrap();

        assert!(strategy.get::<u8>().unwrap().is_none());
    }

    #[test]
    fn test_method_strategy_key() {
        let cache = StrategyCache::new(MemoryBackend::new());
        let strategy = cache
            .method(&CallDescriptor::new("Math", "Max").arg(3).arg(9))
            .unwrap();

        assert_eq!(strategy.key(), "Math.Max.3.9");
        assert_eq!(strategy.region(), "Math");
    }

    #[test]
    fn test_expire_after_sets_sliding_window() {
        let cache = StrategyCache::new(MemoryBackend::new());
        let strategy = cache
            .with_key("Session")
            .expire_after(std::time::Duration::from_secs(30));

        assert_eq!(
            strategy.expiration().sliding,
            Some(std::time::Duration::from_secs(30))
        );
    }
}
