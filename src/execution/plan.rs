//! Execution Plans
//!
//! Runs the cache protocol for one key: fetch the entry, validate it, and
//! when it is unusable retrieve a fresh value and store it.
//!
//! ```text
//! Start -> Fetched -> Validated -> Done
//!                              \-> NeedsRetrieval -> Retrieved -> Done
//! ```

use tracing::{debug, warn};

use crate::cache::{CacheBackend, CacheValue, CachedEntry, Expiration, ValidationResult};
use crate::error::{BoxError, CacheBackendError, CacheError, Result};
use crate::execution::{CacheExceptionHandler, CircuitBreakerState};
use crate::strategy::{AsyncCallbacks, Callbacks, RetrievalErrorFn, RetrievalErrorResult};

/// What a handled backend failure does to the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailurePolicy {
    /// Keep going: a failed read is a miss, a failed write yields a sentinel.
    Degrade,
    /// Stop the run and report the failure to the caller of `run`.
    Abort,
}

/// Why a run stopped early.
enum Interrupt {
    /// A backend failure the exception handler accepted (only under `Abort`).
    Handled(CacheBackendError),
    /// An error that must reach the caller.
    Failed(CacheError),
}

impl From<CacheError> for Interrupt {
    fn from(err: CacheError) -> Self {
        Interrupt::Failed(err)
    }
}

type Outcome<T> = std::result::Result<T, Interrupt>;

// == Execution Plan ==
/// The protocol engine for a single `(key, region)`.
pub struct ExecutionPlan<'a, B> {
    backend: &'a B,
    handler: &'a dyn CacheExceptionHandler,
    key: &'a str,
    region: &'a str,
    expiration: Expiration,
}

impl<'a, B: CacheBackend> ExecutionPlan<'a, B> {
    pub fn new(
        backend: &'a B,
        handler: &'a dyn CacheExceptionHandler,
        key: &'a str,
        region: &'a str,
        expiration: Expiration,
    ) -> Self {
        Self {
            backend,
            handler,
            key,
            region,
            expiration,
        }
    }

    pub fn key(&self) -> &str {
        self.key
    }

    pub fn region(&self) -> &str {
        self.region
    }

    /// Runs the protocol. Handled backend failures degrade instead of failing.
    pub fn execute<V: CacheValue>(&self, callbacks: &Callbacks<V>) -> Result<Option<CachedEntry<V>>> {
        finish(self.run(callbacks, FailurePolicy::Degrade))
    }

    /// Async twin of [`ExecutionPlan::execute`].
    pub async fn execute_async<V: CacheValue>(
        &self,
        callbacks: &AsyncCallbacks<V>,
    ) -> Result<Option<CachedEntry<V>>> {
        finish(self.run_async(callbacks, FailurePolicy::Degrade).await)
    }

    fn run<V: CacheValue>(
        &self,
        callbacks: &Callbacks<V>,
        policy: FailurePolicy,
    ) -> Outcome<Option<CachedEntry<V>>> {
        let existing = self.fetch::<V>(policy)?;

        let verdict = match (&existing, &callbacks.validate) {
            (Some(entry), Some(validate)) => validate(entry),
            _ => ValidationResult::Unknown,
        };
        if self.accept(existing.as_ref(), verdict, policy)? {
            return Ok(existing);
        }

        let Some(retrieve) = &callbacks.retrieve else {
            self.discard(policy)?;
            return Ok(None);
        };

        debug!(key = %self.key, region = %self.region, "Retrieving value");
        let value = match retrieve() {
            Ok(value) => value,
            Err(err) => self.recover(err, existing.as_ref(), callbacks.on_retrieval_error.as_ref())?,
        };

        self.store(value, policy).map(Some)
    }

    async fn run_async<V: CacheValue>(
        &self,
        callbacks: &AsyncCallbacks<V>,
        policy: FailurePolicy,
    ) -> Outcome<Option<CachedEntry<V>>> {
        let existing = self.fetch::<V>(policy)?;

        let verdict = match (&existing, &callbacks.validate) {
            (Some(entry), Some(validate)) => validate(entry.clone()).await,
            _ => ValidationResult::Unknown,
        };
        if self.accept(existing.as_ref(), verdict, policy)? {
            return Ok(existing);
        }

        let Some(retrieve) = &callbacks.retrieve else {
            self.discard(policy)?;
            return Ok(None);
        };

        debug!(key = %self.key, region = %self.region, "Retrieving value");
        let value = match retrieve().await {
            Ok(value) => value,
            Err(err) => self.recover(err, existing.as_ref(), callbacks.on_retrieval_error.as_ref())?,
        };

        self.store(value, policy).map(Some)
    }

    // == Protocol Steps ==

    /// Offers a backend failure to the exception handler.
    ///
    /// `Ok(())` means the failure was handled and the run may degrade.
    fn offer(&self, err: CacheBackendError, policy: FailurePolicy) -> Outcome<()> {
        if !self.handler.try_handle(&err) {
            return Err(Interrupt::Failed(err.into()));
        }

        warn!(
            key = %self.key,
            region = %self.region,
            error = %err,
            "Handled cache backend failure"
        );
        match policy {
            FailurePolicy::Degrade => Ok(()),
            FailurePolicy::Abort => Err(Interrupt::Handled(err)),
        }
    }

    fn fetch<V: CacheValue>(&self, policy: FailurePolicy) -> Outcome<Option<CachedEntry<V>>> {
        match self.backend.get::<V>(self.key, self.region) {
            Ok(Some(entry)) => {
                debug!(key = %self.key, region = %self.region, version = entry.version, "Cache hit");
                Ok(Some(entry))
            }
            Ok(None) => {
                debug!(key = %self.key, region = %self.region, "Cache miss");
                Ok(None)
            }
            Err(err) => self.offer(err, policy).map(|()| None),
        }
    }

    /// Applies the validation verdict and reports whether `existing` is usable.
    fn accept<V>(
        &self,
        existing: Option<&CachedEntry<V>>,
        verdict: ValidationResult,
        policy: FailurePolicy,
    ) -> Outcome<bool> {
        match verdict {
            ValidationResult::Valid => {
                if let Err(err) = self.backend.mark_validated(self.key, self.region) {
                    self.offer(err, policy)?;
                }
                Ok(true)
            }
            ValidationResult::Invalid => {
                debug!(key = %self.key, region = %self.region, "Cached entry invalidated");
                Ok(false)
            }
            ValidationResult::Unknown => Ok(existing.is_some()),
        }
    }

    /// Removes the slot when there is nothing to repopulate it with.
    fn discard(&self, policy: FailurePolicy) -> Outcome<()> {
        match self.backend.remove(self.key, self.region) {
            Ok(()) => Ok(()),
            Err(err) => self.offer(err, policy),
        }
    }

    fn recover<V: CacheValue>(
        &self,
        err: BoxError,
        previous: Option<&CachedEntry<V>>,
        on_error: Option<&RetrievalErrorFn<V>>,
    ) -> Outcome<V> {
        if let Some(on_error) = on_error {
            if let RetrievalErrorResult::Handled(fallback) = on_error(&err, previous) {
                warn!(
                    key = %self.key,
                    region = %self.region,
                    error = %err,
                    "Retrieval failed; using fallback value"
                );
                return Ok(fallback);
            }
        }
        Err(Interrupt::Failed(CacheError::Retrieval(err)))
    }

    fn store<V: CacheValue>(&self, value: V, policy: FailurePolicy) -> Outcome<CachedEntry<V>> {
        // The value is kept aside so a handled failure can still return it.
        let fallback = value.clone();
        match self.backend.set(self.key, self.region, value, &self.expiration) {
            Ok(entry) => {
                debug!(key = %self.key, region = %self.region, version = entry.version, "Stored value");
                Ok(entry)
            }
            Err(err) => {
                self.offer(err, policy)?;
                Ok(CachedEntry::unpersisted(fallback))
            }
        }
    }
}

fn finish<T>(outcome: Outcome<Option<T>>) -> Result<Option<T>> {
    match outcome {
        Ok(entry) => Ok(entry),
        Err(Interrupt::Failed(err)) => Err(err),
        // Only produced under FailurePolicy::Abort.
        Err(Interrupt::Handled(_)) => Ok(None),
    }
}

// == Circuit Breaker Plan ==
/// Wraps an [`ExecutionPlan`] with a circuit breaker.
///
/// While the circuit is open the backend is not touched and the run yields
/// `None`. A handled backend failure trips the breaker and yields `None`;
/// a clean run resets it. Unhandled failures and retrieval errors propagate
/// without affecting the breaker.
pub struct CircuitBreakerPlan<'a, B> {
    plan: ExecutionPlan<'a, B>,
    breaker: &'a dyn CircuitBreakerState,
}

impl<'a, B: CacheBackend> CircuitBreakerPlan<'a, B> {
    pub fn new(plan: ExecutionPlan<'a, B>, breaker: &'a dyn CircuitBreakerState) -> Self {
        Self { plan, breaker }
    }

    pub fn execute<V: CacheValue>(&self, callbacks: &Callbacks<V>) -> Result<Option<CachedEntry<V>>> {
        if self.is_blocked() {
            return Ok(None);
        }
        let outcome = self.plan.run(callbacks, FailurePolicy::Abort);
        self.settle(outcome)
    }

    pub async fn execute_async<V: CacheValue>(
        &self,
        callbacks: &AsyncCallbacks<V>,
    ) -> Result<Option<CachedEntry<V>>> {
        if self.is_blocked() {
            return Ok(None);
        }
        let outcome = self.plan.run_async(callbacks, FailurePolicy::Abort).await;
        self.settle(outcome)
    }

    fn is_blocked(&self) -> bool {
        let open = self.breaker.is_open();
        if open {
            debug!(key = %self.plan.key, region = %self.plan.region, "Circuit open; skipping backend");
        }
        open
    }

    fn settle<T>(&self, outcome: Outcome<Option<T>>) -> Result<Option<T>> {
        match outcome {
            Ok(entry) => {
                self.breaker.reset();
                Ok(entry)
            }
            Err(Interrupt::Handled(err)) => {
                self.breaker.try_break(err);
                Ok(None)
            }
            Err(Interrupt::Failed(err)) => Err(err),
        }
    }
}
