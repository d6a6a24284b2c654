//! Strategy Callbacks
//!
//! The validation, retrieval and retrieval-failure callbacks a strategy
//! carries, in synchronous and asynchronous flavours.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::cache::{CachedEntry, ValidationResult};
use crate::error::BoxError;

pub type ValidateFn<V> = Arc<dyn Fn(&CachedEntry<V>) -> ValidationResult + Send + Sync>;
pub type RetrieveFn<V> = Arc<dyn Fn() -> Result<V, BoxError> + Send + Sync>;
pub type RetrievalErrorFn<V> =
    Arc<dyn Fn(&BoxError, Option<&CachedEntry<V>>) -> RetrievalErrorResult<V> + Send + Sync>;

pub type AsyncValidateFn<V> =
    Arc<dyn Fn(CachedEntry<V>) -> BoxFuture<'static, ValidationResult> + Send + Sync>;
pub type AsyncRetrieveFn<V> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<V, BoxError>> + Send + Sync>;

// == Retrieval Error Result ==
/// Outcome of a retrieval-failure handler.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalErrorResult<V> {
    /// Use this value as if retrieval had produced it
    Handled(V),
    /// Propagate the original retrieval error
    Unhandled,
}

impl<V: Clone> RetrievalErrorResult<V> {
    /// Falls back to the previous cached value when one exists.
    pub fn use_previous_cached_value(
        _error: &BoxError,
        previous: Option<&CachedEntry<V>>,
    ) -> Self {
        match previous {
            Some(entry) => RetrievalErrorResult::Handled(entry.value.clone()),
            None => RetrievalErrorResult::Unhandled,
        }
    }

    /// Falls back to the previous cached value, or to `default` when there is none.
    pub fn use_previous_cached_value_or(previous: Option<&CachedEntry<V>>, default: V) -> Self {
        RetrievalErrorResult::Handled(previous.map_or(default, |entry| entry.value.clone()))
    }

    pub fn is_handled(&self) -> bool {
        matches!(self, RetrievalErrorResult::Handled(_))
    }
}

// == Callback Sets ==
/// Callbacks consulted by the synchronous execution path.
pub struct Callbacks<V> {
    pub validate: Option<ValidateFn<V>>,
    pub retrieve: Option<RetrieveFn<V>>,
    pub on_retrieval_error: Option<RetrievalErrorFn<V>>,
}

impl<V> Default for Callbacks<V> {
    fn default() -> Self {
        Self {
            validate: None,
            retrieve: None,
            on_retrieval_error: None,
        }
    }
}

impl<V> Clone for Callbacks<V> {
    fn clone(&self) -> Self {
        Self {
            validate: self.validate.clone(),
            retrieve: self.retrieve.clone(),
            on_retrieval_error: self.on_retrieval_error.clone(),
        }
    }
}

/// Callbacks consulted by the asynchronous execution path.
pub struct AsyncCallbacks<V> {
    pub validate: Option<AsyncValidateFn<V>>,
    pub retrieve: Option<AsyncRetrieveFn<V>>,
    pub on_retrieval_error: Option<RetrievalErrorFn<V>>,
}

impl<V> Default for AsyncCallbacks<V> {
    fn default() -> Self {
        Self {
            validate: None,
            retrieve: None,
            on_retrieval_error: None,
        }
    }
}

impl<V> Clone for AsyncCallbacks<V> {
    fn clone(&self) -> Self {
        Self {
            validate: self.validate.clone(),
            retrieve: self.retrieve.clone(),
            on_retrieval_error: self.on_retrieval_error.clone(),
        }
    }
}

impl<V: Send + 'static> AsyncCallbacks<V> {
    /// Lifts synchronous callbacks onto the asynchronous path.
    pub fn from_sync(callbacks: Callbacks<V>) -> Self {
        Self {
            validate: callbacks.validate.map(lift_validate),
            retrieve: callbacks.retrieve.map(|retrieve| -> AsyncRetrieveFn<V> {
                Arc::new(move || futures::future::ready(retrieve()).boxed())
            }),
            on_retrieval_error: callbacks.on_retrieval_error,
        }
    }
}

/// Adapts a synchronous validator to the asynchronous signature.
pub fn lift_validate<V: Send + 'static>(validate: ValidateFn<V>) -> AsyncValidateFn<V> {
    Arc::new(move |entry: CachedEntry<V>| futures::future::ready(validate(&entry)).boxed())
}

/// Boxes an async retrieval closure.
pub fn boxed_retrieve<V, F, Fut>(retrieve: F) -> AsyncRetrieveFn<V>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, BoxError>> + Send + 'static,
{
    Arc::new(move || retrieve().boxed())
}

/// Boxes an async validation closure.
pub fn boxed_validate<V, F, Fut>(validate: F) -> AsyncValidateFn<V>
where
    F: Fn(CachedEntry<V>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ValidationResult> + Send + 'static,
{
    Arc::new(move |entry| validate(entry).boxed())
}
