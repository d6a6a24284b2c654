//! Memory Backend Module
//!
//! In-process cache backend: a map from `(region, key)` to type-erased
//! slots, with sliding expiration evaluated on access.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::cache::backend::{BackendResult, CacheBackend, CacheValue};
use crate::cache::{CacheStats, CachedEntry, Expiration};
use crate::error::{CacheBackendError, CacheOperation};

// == Slot ==
/// Stored form of one entry.
struct Slot {
    value: Arc<dyn Any + Send + Sync>,
    cached_at: DateTime<Utc>,
    last_validated_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
    version: i64,
    expiration: Expiration,
}

impl Slot {
    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_expired_at(self.last_accessed_at, now)
    }

    fn to_entry<V: CacheValue>(&self, value: V) -> CachedEntry<V> {
        CachedEntry::new(value, self.cached_at, self.last_validated_at, self.version)
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<SlotKey, Slot>,
    stats: CacheStats,
}

// == Memory Backend ==
/// Thread-safe in-memory backend.
///
/// Updates keep the original `cached_at` and bump the version; a write to a
/// key whose sliding window already elapsed counts as a fresh insert.
#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    // == Constructor ==
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    // == Stats ==
    /// Returns current backend statistics.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let mut stats = inner.stats.clone();
        stats.set_total_entries(inner.entries.len());
        stats
    }

    // == Cleanup Expired ==
    /// Removes all entries whose sliding window has elapsed.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let Inner { entries, stats } = &mut *inner;

        let before = entries.len();
        entries.retain(|_, slot| !slot.is_expired_at(now));
        let removed = before - entries.len();

        stats.record_expirations(removed);
        stats.set_total_entries(entries.len());
        removed
    }

    // == Length ==
    /// Returns the number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

/// `(region, key)`, never joined into one string.
type SlotKey = (String, String);

fn storage_key(key: &str, region: &str) -> SlotKey {
    (region.to_owned(), key.to_owned())
}

impl CacheBackend for MemoryBackend {
    // == Get ==
    fn get<V: CacheValue>(&self, key: &str, region: &str) -> BackendResult<Option<CachedEntry<V>>> {
        let now = Utc::now();
        let k = storage_key(key, region);
        let mut inner = self.inner.lock();
        let Inner { entries, stats } = &mut *inner;

        let expired = match entries.get(&k) {
            Some(slot) => slot.is_expired_at(now),
            None => {
                stats.record_miss();
                return Ok(None);
            }
        };

        if expired {
            entries.remove(&k);
            stats.record_expirations(1);
            stats.record_miss();
            stats.set_total_entries(entries.len());
            debug!(key = %key, region = %region, "Entry expired on read");
            return Ok(None);
        }

        let Some(slot) = entries.get_mut(&k) else {
            stats.record_miss();
            return Ok(None);
        };

        let value = slot.value.downcast_ref::<V>().cloned().ok_or_else(|| {
            CacheBackendError::new(
                CacheOperation::Get,
                format!(
                    "entry '{}' in region '{}' does not hold a value of type {}",
                    key,
                    region,
                    type_name::<V>()
                ),
            )
        })?;

        slot.last_accessed_at = now;
        stats.record_hit();
        Ok(Some(slot.to_entry(value)))
    }

    // == Set ==
    fn set<V: CacheValue>(
        &self,
        key: &str,
        region: &str,
        value: V,
        expiration: &Expiration,
    ) -> BackendResult<CachedEntry<V>> {
        let now = Utc::now();
        let k = storage_key(key, region);
        let stored: Arc<dyn Any + Send + Sync> = Arc::new(value.clone());
        let mut inner = self.inner.lock();
        let Inner { entries, stats } = &mut *inner;

        let entry = match entries.get_mut(&k) {
            Some(slot) if !slot.is_expired_at(now) => {
                slot.value = stored;
                slot.version += 1;
                slot.last_validated_at = now;
                slot.last_accessed_at = now;
                slot.expiration = *expiration;
                slot.to_entry(value)
            }
            _ => {
                let slot = Slot {
                    value: stored,
                    cached_at: now,
                    last_validated_at: now,
                    last_accessed_at: now,
                    version: 0,
                    expiration: *expiration,
                };
                let entry = slot.to_entry(value);
                entries.insert(k, slot);
                entry
            }
        };

        stats.record_write();
        stats.set_total_entries(entries.len());
        debug!(key = %key, region = %region, version = entry.version, "Entry written");
        Ok(entry)
    }

    // == Remove ==
    fn remove(&self, key: &str, region: &str) -> BackendResult<()> {
        let k = storage_key(key, region);
        let mut inner = self.inner.lock();
        let Inner { entries, stats } = &mut *inner;

        if entries.remove(&k).is_some() {
            stats.record_removal();
            stats.set_total_entries(entries.len());
        }
        Ok(())
    }

    // == Mark Validated ==
    fn mark_validated(&self, key: &str, region: &str) -> BackendResult<()> {
        let now = Utc::now();
        let k = storage_key(key, region);
        let mut inner = self.inner.lock();
        let Inner { entries, stats } = &mut *inner;

        if let Some(slot) = entries.get_mut(&k) {
            slot.last_validated_at = now;
            stats.record_validation();
        }
        Ok(())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_backend_new() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.len(), 0);
        assert!(backend.is_empty());
    }

    #[test]
    fn test_set_then_get() {
        let backend = MemoryBackend::new();

        let written = backend
            .set("Sqrt", "Math", 1.414_f64, &Expiration::never())
            .unwrap();
        let read = backend.get::<f64>("Sqrt", "Math").unwrap().unwrap();

        assert_eq!(written.version, 0);
        assert_eq!(read.value, 1.414);
        assert_eq!(read.version, 0);
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn test_get_absent_is_none() {
        let backend = MemoryBackend::new();
        assert!(backend.get::<String>("missing", "r").unwrap().is_none());
        assert_eq!(backend.stats().misses, 1);
    }

    #[test]
    fn test_regions_are_separate() {
        let backend = MemoryBackend::new();
        backend.set("k", "a", 1_u32, &Expiration::never()).unwrap();
        backend.set("k", "b", 2_u32, &Expiration::never()).unwrap();

        assert_eq!(backend.get::<u32>("k", "a").unwrap().unwrap().value, 1);
        assert_eq!(backend.get::<u32>("k", "b").unwrap().unwrap().value, 2);
    }

    #[test]
    fn test_separator_in_region_does_not_merge_slots() {
        let backend = MemoryBackend::new();
        backend.set("c", "a:b", 1_i32, &Expiration::never()).unwrap();

        assert!(backend.get::<i32>("b:c", "a").unwrap().is_none());

        let other = backend.set("b:c", "a", 2_i32, &Expiration::never()).unwrap();
        assert_eq!(other.version, 0);
        assert_eq!(backend.len(), 2);
        assert_eq!(backend.get::<i32>("c", "a:b").unwrap().unwrap().value, 1);
    }

    #[test]
    fn test_update_increments_version_and_keeps_cached_at() {
        let backend = MemoryBackend::new();

        let first = backend.set("k", "r", "v1".to_string(), &Expiration::never()).unwrap();
        sleep(Duration::from_millis(5));
        let second = backend.set("k", "r", "v2".to_string(), &Expiration::never()).unwrap();
        let third = backend.set("k", "r", "v3".to_string(), &Expiration::never()).unwrap();

        assert_eq!(first.version, 0);
        assert_eq!(second.version, 1);
        assert_eq!(third.version, 2);
        assert_eq!(third.cached_at, first.cached_at);
        assert!(second.last_validated_at > first.last_validated_at);
        assert_eq!(backend.get::<String>("k", "r").unwrap().unwrap().value, "v3");
    }

    #[test]
    fn test_remove_resets_version() {
        let backend = MemoryBackend::new();
        backend.set("k", "r", 1_i32, &Expiration::never()).unwrap();
        backend.set("k", "r", 2_i32, &Expiration::never()).unwrap();

        backend.remove("k", "r").unwrap();
        let fresh = backend.set("k", "r", 3_i32, &Expiration::never()).unwrap();

        assert_eq!(fresh.version, 0);
    }

    #[test]
    fn test_remove_absent_is_ok() {
        let backend = MemoryBackend::new();

        assert!(backend.remove("nope", "r").is_ok());
        assert!(backend.get::<i32>("nope", "r").unwrap().is_none());
        assert_eq!(backend.stats().removals, 0);
    }

    #[test]
    fn test_mark_validated_refreshes_timestamp_only() {
        let backend = MemoryBackend::new();
        let written = backend.set("k", "r", 7_u8, &Expiration::never()).unwrap();
        sleep(Duration::from_millis(5));

        backend.mark_validated("k", "r").unwrap();
        let read = backend.get::<u8>("k", "r").unwrap().unwrap();

        assert_eq!(read.value, 7);
        assert_eq!(read.version, written.version);
        assert_eq!(read.cached_at, written.cached_at);
        assert!(read.last_validated_at > written.last_validated_at);
    }

    #[test]
    fn test_mark_validated_absent_is_noop() {
        let backend = MemoryBackend::new();

        backend.mark_validated("ghost", "r").unwrap();

        assert!(backend.is_empty());
        assert_eq!(backend.stats().validations, 0);
    }

    #[test]
    fn test_type_mismatch_is_get_error() {
        let backend = MemoryBackend::new();
        backend.set("k", "r", 1_i32, &Expiration::never()).unwrap();

        let err = backend.get::<String>("k", "r").unwrap_err();
        assert_eq!(err.operation, CacheOperation::Get);
    }

    #[test]
    fn test_sliding_expiration_on_read() {
        let backend = MemoryBackend::new();
        let policy = Expiration::sliding(Duration::from_millis(50));
        backend.set("k", "r", 1_i32, &policy).unwrap();

        assert!(backend.get::<i32>("k", "r").unwrap().is_some());

        sleep(Duration::from_millis(120));

        assert!(backend.get::<i32>("k", "r").unwrap().is_none());
        assert!(backend.is_empty());
        assert_eq!(backend.stats().expirations, 1);
    }

    #[test]
    fn test_reads_slide_the_window() {
        let backend = MemoryBackend::new();
        let policy = Expiration::sliding(Duration::from_millis(150));
        backend.set("k", "r", 1_i32, &policy).unwrap();

        for _ in 0..4 {
            sleep(Duration::from_millis(60));
            assert!(backend.get::<i32>("k", "r").unwrap().is_some());
        }
    }

    #[test]
    fn test_write_after_expiry_starts_at_version_zero() {
        let backend = MemoryBackend::new();
        let policy = Expiration::sliding(Duration::from_millis(30));
        backend.set("k", "r", 1_i32, &policy).unwrap();
        backend.set("k", "r", 2_i32, &policy).unwrap();

        sleep(Duration::from_millis(80));

        let fresh = backend.set("k", "r", 3_i32, &policy).unwrap();
        assert_eq!(fresh.version, 0);
    }

    #[test]
    fn test_cleanup_expired() {
        let backend = MemoryBackend::new();
        backend
            .set("short", "r", 1_i32, &Expiration::sliding(Duration::from_millis(30)))
            .unwrap();
        backend
            .set("long", "r", 2_i32, &Expiration::sliding(Duration::from_secs(60)))
            .unwrap();
        backend.set("forever", "r", 3_i32, &Expiration::never()).unwrap();

        sleep(Duration::from_millis(80));

        assert_eq!(backend.cleanup_expired(), 1);
        assert_eq!(backend.len(), 2);
        assert!(backend.get::<i32>("long", "r").unwrap().is_some());
    }

    #[test]
    fn test_stats_track_activity() {
        let backend = MemoryBackend::new();
        backend.set("k", "r", 1_i32, &Expiration::never()).unwrap();
        backend.get::<i32>("k", "r").unwrap();
        backend.get::<i32>("other", "r").unwrap();
        backend.mark_validated("k", "r").unwrap();
        backend.remove("k", "r").unwrap();

        let stats = backend.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.validations, 1);
        assert_eq!(stats.removals, 1);
        assert_eq!(stats.total_entries, 0);
    }
}
