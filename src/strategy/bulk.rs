//! Bulk Cache Strategies
//!
//! Apply the single-item protocol across a set of keys. Keys with a usable
//! cached entry are served from the cache; the remaining keys are handed to
//! one batched retrieval call and the results written back item by item.
//!
//! Each item lives under `<strategy key>&itemkey=<key fragment>`.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use crate::cache::{CacheBackend, CacheValue, CachedEntry, ValidationResult};
use crate::error::{BoxError, CacheError, Result};
use crate::keys::ParamValue;
use crate::strategy::callbacks::{boxed_validate, lift_validate};
use crate::strategy::{AsyncCallbacks, AsyncValidateFn, Callbacks, StrategyTarget, ValidateFn};

/// Bound satisfied by every type usable as a bulk item key.
pub trait BulkKey: Clone + Eq + Hash + Into<ParamValue> + Send + Sync + 'static {}

impl<T> BulkKey for T where T: Clone + Eq + Hash + Into<ParamValue> + Send + Sync + 'static {}

pub type BulkRetrieveFn<K, V> =
    Arc<dyn Fn(Vec<K>) -> std::result::Result<Vec<(K, V)>, BoxError> + Send + Sync>;
pub type AsyncBulkRetrieveFn<K, V> =
    Arc<dyn Fn(Vec<K>) -> BoxFuture<'static, std::result::Result<Vec<(K, V)>, BoxError>> + Send + Sync>;

// == Shared Steps ==

fn item_key<B: CacheBackend, K: BulkKey>(target: &StrategyTarget<B>, key: &K) -> String {
    let fragment = target
        .cache
        .key_deriver()
        .parameter_key(&key.clone().into());
    format!("{}&itemkey={}", target.key(), fragment)
}

fn dedup<K: BulkKey>(keys: impl IntoIterator<Item = K>) -> Vec<K> {
    let mut seen = HashSet::new();
    keys.into_iter().filter(|key| seen.insert(key.clone())).collect()
}

/// Cached entries found for the requested keys, and the keys still missing.
struct Partition<K, V> {
    found: HashMap<K, CachedEntry<V>>,
    misses: Vec<K>,
}

impl<K: BulkKey, V> Partition<K, V> {
    fn new() -> Self {
        Self {
            found: HashMap::new(),
            misses: Vec::new(),
        }
    }

    fn record(&mut self, key: &K, entry: Option<CachedEntry<V>>) {
        match entry {
            Some(entry) => {
                self.found.insert(key.clone(), entry);
            }
            None => self.misses.push(key.clone()),
        }
    }
}

fn partition<B: CacheBackend, K: BulkKey, V: CacheValue>(
    target: &StrategyTarget<B>,
    keys: &[K],
    validate: Option<&ValidateFn<V>>,
) -> Result<Partition<K, V>> {
    let callbacks = Callbacks {
        validate: validate.cloned(),
        ..Callbacks::default()
    };

    let mut partition = Partition::new();
    for key in keys {
        let entry = target.cache.execute(
            &item_key(target, key),
            target.region(),
            target.expiration,
            &callbacks,
        )?;
        partition.record(key, entry);
    }
    log_partition(target, &partition);
    Ok(partition)
}

async fn partition_async<B: CacheBackend, K: BulkKey, V: CacheValue>(
    target: &StrategyTarget<B>,
    keys: &[K],
    validate: Option<&AsyncValidateFn<V>>,
) -> Result<Partition<K, V>> {
    let callbacks = AsyncCallbacks {
        validate: validate.cloned(),
        ..AsyncCallbacks::default()
    };

    let mut partition = Partition::new();
    for key in keys {
        let entry = target
            .cache
            .execute_async(
                &item_key(target, key),
                target.region(),
                target.expiration,
                &callbacks,
            )
            .await?;
        partition.record(key, entry);
    }
    log_partition(target, &partition);
    Ok(partition)
}

fn log_partition<B: CacheBackend, K, V>(target: &StrategyTarget<B>, partition: &Partition<K, V>) {
    debug!(
        key = %target.key(),
        hits = partition.found.len(),
        misses = partition.misses.len(),
        "Bulk lookup partitioned"
    );
}

/// Writes retrieved pairs and assembles the result in request order.
///
/// Pairs for keys that were not requested are written but not returned.
fn assemble<B: CacheBackend, K: BulkKey, V: CacheValue>(
    target: &StrategyTarget<B>,
    keys: &[K],
    mut found: HashMap<K, CachedEntry<V>>,
    retrieved: Vec<(K, V)>,
) -> Result<Vec<(K, CachedEntry<V>)>> {
    for (key, value) in retrieved {
        let entry = target.cache.write(
            &item_key(target, &key),
            target.region(),
            value,
            &target.expiration,
        )?;
        found.insert(key, entry);
    }

    Ok(keys
        .iter()
        .filter_map(|key| found.remove(key).map(|entry| (key.clone(), entry)))
        .collect())
}

fn values<K, V>(entries: Vec<(K, CachedEntry<V>)>) -> Vec<(K, V)> {
    entries
        .into_iter()
        .map(|(key, entry)| (key, entry.into_value()))
        .collect()
}

fn invalid_when<V>(predicate: impl Fn(&CachedEntry<V>) -> bool) -> impl Fn(&CachedEntry<V>) -> ValidationResult {
    move |entry| {
        if predicate(entry) {
            ValidationResult::Invalid
        } else {
            ValidationResult::Valid
        }
    }
}

// == Bulk Cache Strategy Incomplete ==
/// Key material plus the item keys, before a value type is bound.
pub struct BulkCacheStrategyIncomplete<B, K> {
    pub(crate) target: StrategyTarget<B>,
    keys: Vec<K>,
}

impl<B: CacheBackend, K: BulkKey> BulkCacheStrategyIncomplete<B, K> {
    /// Duplicate keys are dropped, keeping the first occurrence.
    pub(crate) fn new(target: StrategyTarget<B>, keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            target,
            keys: dedup(keys),
        }
    }

    key_builders!();

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// The cache key of the item stored for `key`.
    pub fn item_key(&self, key: &K) -> String {
        item_key(&self.target, key)
    }

    /// Removes every item of this strategy's key set.
    pub fn clear_values(&self) -> Result<()> {
        for key in &self.keys {
            self.target
                .cache
                .delete(&item_key(&self.target, key), self.target.region())?;
        }
        Ok(())
    }

    /// Writes one item.
    pub fn set_value<V: CacheValue>(&self, key: &K, value: V) -> Result<CachedEntry<V>> {
        self.target.cache.write(
            &item_key(&self.target, key),
            self.target.region(),
            value,
            &self.target.expiration,
        )
    }

    /// Writes each `(key, value)` pair.
    pub fn set_values<V: CacheValue>(&self, values: impl IntoIterator<Item = (K, V)>) -> Result<()> {
        for (key, value) in values {
            self.set_value(&key, value)?;
        }
        Ok(())
    }

    /// Binds the value type without a retrieval callback.
    pub fn complete<V: CacheValue>(self) -> BulkCacheStrategy<B, K, V> {
        BulkCacheStrategy {
            target: self.target,
            keys: self.keys,
            validate: None,
            retrieve: None,
        }
    }

    /// Sets the batched retrieval callback. It receives exactly the keys
    /// that had no usable cached entry.
    pub fn retrieve_using<V, F>(self, retrieve: F) -> BulkCacheStrategy<B, K, V>
    where
        V: CacheValue,
        F: Fn(Vec<K>) -> std::result::Result<Vec<(K, V)>, BoxError> + Send + Sync + 'static,
    {
        self.complete().retrieve_using(retrieve)
    }

    pub fn retrieve_using_async<V, F, Fut>(self, retrieve: F) -> BulkCacheStrategyAsync<B, K, V>
    where
        V: CacheValue,
        F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Vec<(K, V)>, BoxError>> + Send + 'static,
    {
        BulkCacheStrategyAsync {
            target: self.target,
            keys: self.keys,
            validate: None,
            retrieve: None,
        }
        .retrieve_using_async(retrieve)
    }
}

// == Bulk Cache Strategy ==
pub struct BulkCacheStrategy<B, K, V> {
    pub(crate) target: StrategyTarget<B>,
    keys: Vec<K>,
    validate: Option<ValidateFn<V>>,
    retrieve: Option<BulkRetrieveFn<K, V>>,
}

impl<B: CacheBackend, K: BulkKey, V: CacheValue> BulkCacheStrategy<B, K, V> {
    key_builders!();

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Validation callback applied to every cached item.
    pub fn validate<F>(mut self, validate: F) -> Self
    where
        F: Fn(&CachedEntry<V>) -> ValidationResult + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(validate));
        self
    }

    pub fn invalidate_if<F>(self, predicate: F) -> Self
    where
        F: Fn(&CachedEntry<V>) -> bool + Send + Sync + 'static,
    {
        self.validate(invalid_when(predicate))
    }

    pub fn retrieve_using<F>(mut self, retrieve: F) -> Self
    where
        F: Fn(Vec<K>) -> std::result::Result<Vec<(K, V)>, BoxError> + Send + Sync + 'static,
    {
        self.retrieve = Some(Arc::new(retrieve));
        self
    }

    /// Returns one entry per requested key that was cached and usable or
    /// produced by retrieval, in request order. Other keys are absent.
    pub fn get_all(&self) -> Result<Vec<(K, CachedEntry<V>)>> {
        let Partition { found, misses } = partition(&self.target, &self.keys, self.validate.as_ref())?;

        let retrieved = match &self.retrieve {
            Some(retrieve) if !misses.is_empty() => retrieve(misses).map_err(CacheError::Retrieval)?,
            _ => Vec::new(),
        };

        assemble(&self.target, &self.keys, found, retrieved)
    }

    pub fn get_all_values(&self) -> Result<Vec<(K, V)>> {
        self.get_all().map(values)
    }

    /// Removes every item of this strategy's key set.
    pub fn clear_values(&self) -> Result<()> {
        for key in &self.keys {
            self.target
                .cache
                .delete(&item_key(&self.target, key), self.target.region())?;
        }
        Ok(())
    }
}

// == Bulk Cache Strategy Async ==
pub struct BulkCacheStrategyAsync<B, K, V> {
    pub(crate) target: StrategyTarget<B>,
    keys: Vec<K>,
    validate: Option<AsyncValidateFn<V>>,
    retrieve: Option<AsyncBulkRetrieveFn<K, V>>,
}

impl<B: CacheBackend, K: BulkKey, V: CacheValue> BulkCacheStrategyAsync<B, K, V> {
    key_builders!();

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn validate<F>(mut self, validate: F) -> Self
    where
        F: Fn(&CachedEntry<V>) -> ValidationResult + Send + Sync + 'static,
    {
        self.validate = Some(lift_validate(Arc::new(validate)));
        self
    }

    pub fn validate_async<F, Fut>(mut self, validate: F) -> Self
    where
        F: Fn(CachedEntry<V>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ValidationResult> + Send + 'static,
    {
        self.validate = Some(boxed_validate(validate));
        self
    }

    pub fn invalidate_if<F>(self, predicate: F) -> Self
    where
        F: Fn(&CachedEntry<V>) -> bool + Send + Sync + 'static,
    {
        self.validate(invalid_when(predicate))
    }

    pub fn retrieve_using_async<F, Fut>(mut self, retrieve: F) -> Self
    where
        F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Vec<(K, V)>, BoxError>> + Send + 'static,
    {
        self.retrieve = Some(Arc::new(move |keys: Vec<K>| retrieve(keys).boxed()));
        self
    }

    pub async fn get_all_async(&self) -> Result<Vec<(K, CachedEntry<V>)>> {
        let Partition { found, misses } =
            partition_async(&self.target, &self.keys, self.validate.as_ref()).await?;

        let retrieved = match &self.retrieve {
            Some(retrieve) if !misses.is_empty() => {
                retrieve(misses).await.map_err(CacheError::Retrieval)?
            }
            _ => Vec::new(),
        };

        assemble(&self.target, &self.keys, found, retrieved)
    }

    pub async fn get_all_values_async(&self) -> Result<Vec<(K, V)>> {
        self.get_all_async().await.map(values)
    }

    pub fn clear_values(&self) -> Result<()> {
        for key in &self.keys {
            self.target
                .cache
                .delete(&item_key(&self.target, key), self.target.region())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBackend;
    use crate::client::StrategyCache;
    use parking_lot::Mutex;

    fn squares(keys: Vec<u32>) -> std::result::Result<Vec<(u32, u64)>, BoxError> {
        Ok(keys.into_iter().map(|k| (k, u64::from(k) * u64::from(k))).collect())
    }

    #[test]
    fn test_item_keys_derive_from_full_key() {
        let cache = StrategyCache::new(MemoryBackend::new());
        let bulk = cache
            .bulk("Square", [1_u32, 2])
            .with_region("Math")
            .with_parameter("v2");

        assert_eq!(bulk.item_key(&1), "Math.Square.v2&itemkey=1");
    }

    #[test]
    fn test_duplicate_keys_are_dropped() {
        let cache = StrategyCache::new(MemoryBackend::new());
        let bulk = cache.bulk("Square", [3_u32, 1, 3, 2, 1]);

        assert_eq!(bulk.keys(), &[3, 1, 2]);
    }

    #[test]
    fn test_retrieval_receives_only_misses() {
        let cache = StrategyCache::new(MemoryBackend::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();

        let incomplete = cache.bulk("Square", ["a", "b", "c"]);
        incomplete.set_value(&"a", 1_i32).unwrap();
        incomplete.set_value(&"b", 2_i32).unwrap();

        let results = incomplete
            .retrieve_using(move |misses: Vec<&'static str>| {
                recorder.lock().extend(misses.clone());
                Ok(misses.into_iter().map(|k| (k, 3)).collect())
            })
            .get_all_values()
            .unwrap();

        assert_eq!(*seen.lock(), vec!["c"]);
        assert_eq!(results, vec![("a", 1), ("b", 2), ("c", 3)]);
    }

    #[test]
    fn test_no_retrieval_when_everything_is_cached() {
        let cache = StrategyCache::new(MemoryBackend::new());
        let bulk = cache.bulk("Square", [1_u32, 2]).retrieve_using(squares);

        bulk.get_all().unwrap();
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let entries = bulk
            .retrieve_using(move |keys| {
                *counter.lock() += 1;
                squares(keys)
            })
            .get_all()
            .unwrap();

        assert_eq!(*calls.lock(), 0);
        assert!(entries.iter().all(|(_, entry)| entry.version == 0));
    }

    #[test]
    fn test_missing_and_extra_keys() {
        let cache = StrategyCache::new(MemoryBackend::new());
        let bulk = cache
            .bulk("Lookup", [1_u32, 2, 3])
            .retrieve_using(|_keys: Vec<u32>| Ok(vec![(3, "three"), (9, "nine")]));

        let results = bulk.get_all_values().unwrap();
        assert_eq!(results, vec![(3, "three")]);

        // The extra pair was still written.
        let extra = cache.bulk("Lookup", [9_u32]).complete::<&str>();
        assert_eq!(extra.get_all_values().unwrap(), vec![(9, "nine")]);
    }

    #[test]
    fn test_invalidated_items_are_reloaded() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = StrategyCache::with_shared(backend.clone());
        let bulk = cache.bulk("Square", [2_u32, 4]).retrieve_using(squares);
        bulk.get_all().unwrap();

        let reloaded = Arc::new(Mutex::new(Vec::new()));
        let recorder = reloaded.clone();
        let entries = bulk
            .invalidate_if(|entry| entry.value > 10)
            .retrieve_using(move |keys| {
                recorder.lock().extend(keys.iter().copied());
                squares(keys)
            })
            .get_all_values()
            .unwrap();

        assert_eq!(*reloaded.lock(), vec![4]);
        assert_eq!(entries, vec![(2, 4), (4, 16)]);
        assert_eq!(backend.stats().validations, 1);
        assert_eq!(backend.stats().removals, 1);
    }

    #[test]
    fn test_clear_values() {
        let cache = StrategyCache::new(MemoryBackend::new());
        let bulk = cache.bulk("Square", [1_u32, 2]);
        bulk.set_values([(1, 1_u64), (2, 4)]).unwrap();

        bulk.clear_values().unwrap();

        assert!(bulk.complete::<u64>().get_all().unwrap().is_empty());
    }

    #[test]
    fn test_bulk_retrieval_error_propagates() {
        let cache = StrategyCache::new(MemoryBackend::new());
        let bulk = cache
            .bulk("Square", [1_u32])
            .retrieve_using(|_keys: Vec<u32>| Err::<Vec<(u32, u64)>, BoxError>("batch failed".into()));

        let err = bulk.get_all().unwrap_err();
        assert!(matches!(err, CacheError::Retrieval(_)));
    }

    #[tokio::test]
    async fn test_async_bulk_partitions_like_sync() {
        let cache = StrategyCache::new(MemoryBackend::new());
        let bulk = cache.bulk("Square", [1_u32, 2, 3]);
        bulk.set_value(&2, 4_u64).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let results = bulk
            .retrieve_using_async(move |misses: Vec<u32>| {
                recorder.lock().extend(misses.iter().copied());
                async move { squares(misses) }
            })
            .get_all_values_async()
            .await
            .unwrap();

        assert_eq!(*seen.lock(), vec![1, 3]);
        assert_eq!(results, vec![(1, 1), (2, 4), (3, 9)]);
    }
}
