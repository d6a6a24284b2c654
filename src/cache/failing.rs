//! Failing Backend Module
//!
//! A decorator that makes selected backend operations fail on demand, used to
//! exercise the degradation paths of the engine.

use std::collections::HashSet;

use parking_lot::RwLock;

use crate::cache::backend::{BackendResult, CacheBackend, CacheValue};
use crate::cache::{CachedEntry, Expiration};
use crate::error::{CacheBackendError, CacheOperation};

/// Wraps a backend and fails the operations currently switched on.
pub struct FailingBackend<B> {
    inner: B,
    failing: RwLock<HashSet<CacheOperation>>,
}

impl<B: CacheBackend> FailingBackend<B> {
    /// Wraps `inner` with no failing operations.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            failing: RwLock::new(HashSet::new()),
        }
    }

    /// Wraps `inner`, failing the given operations from the start.
    pub fn failing(inner: B, operations: impl IntoIterator<Item = CacheOperation>) -> Self {
        let backend = Self::new(inner);
        backend.fail_on(operations);
        backend
    }

    /// Adds operations to the failing set.
    pub fn fail_on(&self, operations: impl IntoIterator<Item = CacheOperation>) {
        self.failing.write().extend(operations);
    }

    /// Makes every operation succeed again.
    pub fn heal(&self) {
        self.failing.write().clear();
    }

    /// Returns the wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn check(&self, operation: CacheOperation) -> BackendResult<()> {
        if self.failing.read().contains(&operation) {
            Err(CacheBackendError::new(
                operation,
                format!("injected {} failure", operation),
            ))
        } else {
            Ok(())
        }
    }
}

impl<B: CacheBackend> CacheBackend for FailingBackend<B> {
    fn get<V: CacheValue>(&self, key: &str, region: &str) -> BackendResult<Option<CachedEntry<V>>> {
        self.check(CacheOperation::Get)?;
        self.inner.get(key, region)
    }

    fn set<V: CacheValue>(
        &self,
        key: &str,
        region: &str,
        value: V,
        expiration: &Expiration,
    ) -> BackendResult<CachedEntry<V>> {
        self.check(CacheOperation::Set)?;
        self.inner.set(key, region, value, expiration)
    }

    fn remove(&self, key: &str, region: &str) -> BackendResult<()> {
        self.check(CacheOperation::Remove)?;
        self.inner.remove(key, region)
    }

    fn mark_validated(&self, key: &str, region: &str) -> BackendResult<()> {
        self.check(CacheOperation::MarkValidated)?;
        self.inner.mark_validated(key, region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBackend;

    #[test]
    fn test_passes_through_when_healthy() {
        let backend = FailingBackend::new(MemoryBackend::new());
        backend.set("k", "r", 1_i32, &Expiration::never()).unwrap();

        assert_eq!(backend.get::<i32>("k", "r").unwrap().unwrap().value, 1);
        assert_eq!(backend.inner().len(), 1);
    }

    #[test]
    fn test_fails_selected_operations_only() {
        let backend = FailingBackend::failing(MemoryBackend::new(), [CacheOperation::Get]);

        let err = backend.get::<i32>("k", "r").unwrap_err();
        assert_eq!(err.operation, CacheOperation::Get);
        assert!(backend.set("k", "r", 1_i32, &Expiration::never()).is_ok());
        assert!(backend.remove("k", "r").is_ok());
    }

    #[test]
    fn test_heal_restores_operations() {
        let backend = FailingBackend::new(MemoryBackend::new());
        backend.fail_on([CacheOperation::Set, CacheOperation::Remove]);
        assert!(backend.remove("k", "r").is_err());

        backend.heal();
        assert!(backend.remove("k", "r").is_ok());
    }
}
