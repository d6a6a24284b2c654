//! Strategy Cache
//!
//! Binds a backend to the strategy builders together with the exception
//! handler, optional circuit breaker, parameter key provider and default
//! expiration every strategy built from it shares.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{CacheBackend, CacheValue, CachedEntry, Expiration};
use crate::config::Config;
use crate::error::{CacheBackendError, Result};
use crate::execution::{
    CacheExceptionHandler, CircuitBreakerPlan, CircuitBreakerState, ExecutionPlan, RethrowAll,
};
use crate::keys::{CallDescriptor, KeyDeriver, KeyMaterial, ParameterKeyProvider};
use crate::strategy::{
    AsyncCallbacks, BulkCacheStrategyIncomplete, BulkKey, CacheStrategyIncomplete, Callbacks,
    StrategyTarget,
};

/// Entry point for building cache strategies against one backend.
///
/// Cloning is cheap; clones share the backend and the circuit breaker.
pub struct StrategyCache<B> {
    backend: Arc<B>,
    deriver: KeyDeriver,
    handler: Arc<dyn CacheExceptionHandler>,
    breaker: Option<Arc<dyn CircuitBreakerState>>,
    default_expiration: Expiration,
}

impl<B> Clone for StrategyCache<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            deriver: self.deriver.clone(),
            handler: self.handler.clone(),
            breaker: self.breaker.clone(),
            default_expiration: self.default_expiration,
        }
    }
}

impl<B> StrategyCache<B> {
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn key_deriver(&self) -> &KeyDeriver {
        &self.deriver
    }

    /// Expiration applied to strategies that do not call `expire_after`.
    pub fn default_expiration(&self) -> Expiration {
        self.default_expiration
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<dyn CircuitBreakerState>> {
        self.breaker.as_ref()
    }
}

impl<B: CacheBackend> StrategyCache<B> {
    // == Constructors ==
    pub fn new(backend: B) -> Self {
        Self::with_shared(Arc::new(backend))
    }

    /// Uses a backend that is also held elsewhere (for example by a cleanup task).
    pub fn with_shared(backend: Arc<B>) -> Self {
        Self {
            backend,
            deriver: KeyDeriver::default(),
            handler: Arc::new(RethrowAll),
            breaker: None,
            default_expiration: Expiration::never(),
        }
    }

    /// Applies the configured default expiration and circuit breaker.
    pub fn from_config(backend: Arc<B>, config: &Config) -> Self {
        Self::with_shared(backend)
            .with_default_expiration(config.default_expiration())
            .with_circuit_breaker(config.circuit_breaker())
    }

    // == Builders ==
    pub fn with_exception_handler(mut self, handler: impl CacheExceptionHandler + 'static) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Guards every execution with `breaker`. Pass an `Arc` to share one
    /// breaker between several caches.
    pub fn with_circuit_breaker(mut self, breaker: impl CircuitBreakerState + 'static) -> Self {
        self.breaker = Some(Arc::new(breaker));
        self
    }

    pub fn with_parameter_key_provider(mut self, provider: impl ParameterKeyProvider + 'static) -> Self {
        self.deriver = KeyDeriver::new(Arc::new(provider));
        self
    }

    pub fn with_default_expiration(mut self, expiration: Expiration) -> Self {
        self.default_expiration = expiration;
        self
    }

    // == Strategy Entry Points ==
    /// Starts a strategy for a plain key with no region.
    pub fn with_key(&self, base_key: impl Into<String>) -> CacheStrategyIncomplete<B> {
        CacheStrategyIncomplete::new(self.target(KeyMaterial::new(base_key)))
    }

    /// Starts a strategy keyed by a call descriptor.
    ///
    /// # Errors
    /// `UnsupportedOperationDescriptor` when the descriptor cannot be keyed.
    pub fn method(&self, descriptor: &CallDescriptor) -> Result<CacheStrategyIncomplete<B>> {
        let material = self.deriver.derive(descriptor)?;
        Ok(CacheStrategyIncomplete::new(self.target(material)))
    }

    /// Starts a bulk strategy over `keys`.
    pub fn bulk<K: BulkKey>(
        &self,
        base_key: impl Into<String>,
        keys: impl IntoIterator<Item = K>,
    ) -> BulkCacheStrategyIncomplete<B, K> {
        BulkCacheStrategyIncomplete::new(self.target(KeyMaterial::new(base_key)), keys)
    }

    /// Starts a bulk strategy keyed by a call descriptor.
    pub fn bulk_method<K: BulkKey>(
        &self,
        descriptor: &CallDescriptor,
        keys: impl IntoIterator<Item = K>,
    ) -> Result<BulkCacheStrategyIncomplete<B, K>> {
        let material = self.deriver.derive(descriptor)?;
        Ok(BulkCacheStrategyIncomplete::new(self.target(material), keys))
    }

    fn target(&self, material: KeyMaterial) -> StrategyTarget<B> {
        StrategyTarget::new(self.clone(), material)
    }

    // == Execution ==
    pub(crate) fn execute<V: CacheValue>(
        &self,
        key: &str,
        region: &str,
        expiration: Expiration,
        callbacks: &Callbacks<V>,
    ) -> Result<Option<CachedEntry<V>>> {
        let plan = ExecutionPlan::new(&*self.backend, &*self.handler, key, region, expiration);
        match &self.breaker {
            Some(breaker) => CircuitBreakerPlan::new(plan, &**breaker).execute(callbacks),
            None => plan.execute(callbacks),
        }
    }

    pub(crate) async fn execute_async<V: CacheValue>(
        &self,
        key: &str,
        region: &str,
        expiration: Expiration,
        callbacks: &AsyncCallbacks<V>,
    ) -> Result<Option<CachedEntry<V>>> {
        let plan = ExecutionPlan::new(&*self.backend, &*self.handler, key, region, expiration);
        match &self.breaker {
            Some(breaker) => {
                CircuitBreakerPlan::new(plan, &**breaker)
                    .execute_async(callbacks)
                    .await
            }
            None => plan.execute_async(callbacks).await,
        }
    }

    /// Writes outside the protocol. A skipped or handled failure yields the
    /// unpersisted sentinel.
    pub(crate) fn write<V: CacheValue>(
        &self,
        key: &str,
        region: &str,
        value: V,
        expiration: &Expiration,
    ) -> Result<CachedEntry<V>> {
        if self.is_blocked(key, region) {
            return Ok(CachedEntry::unpersisted(value));
        }

        let fallback = value.clone();
        match self.backend.set(key, region, value, expiration) {
            Ok(entry) => {
                self.succeeded();
                Ok(entry)
            }
            Err(err) => {
                self.absorb(key, region, err)?;
                Ok(CachedEntry::unpersisted(fallback))
            }
        }
    }

    /// Removes outside the protocol. Skipped or handled failures are ignored.
    pub(crate) fn delete(&self, key: &str, region: &str) -> Result<()> {
        if self.is_blocked(key, region) {
            return Ok(());
        }

        match self.backend.remove(key, region) {
            Ok(()) => {
                self.succeeded();
                Ok(())
            }
            Err(err) => self.absorb(key, region, err),
        }
    }

    fn is_blocked(&self, key: &str, region: &str) -> bool {
        let open = self.breaker.as_ref().is_some_and(|breaker| breaker.is_open());
        if open {
            debug!(key = %key, region = %region, "Circuit open; skipping backend");
        }
        open
    }

    fn succeeded(&self) {
        if let Some(breaker) = &self.breaker {
            breaker.reset();
        }
    }

    fn absorb(&self, key: &str, region: &str, err: CacheBackendError) -> Result<()> {
        if !self.handler.try_handle(&err) {
            return Err(err.into());
        }

        warn!(key = %key, region = %region, error = %err, "Handled cache backend failure");
        if let Some(breaker) = &self.breaker {
            breaker.try_break(err);
        }
        Ok(())
    }
}
