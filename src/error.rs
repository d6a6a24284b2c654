//! Error types for the cache strategy engine
//!
//! Provides unified error handling using thiserror.

use std::fmt;

use thiserror::Error;

/// Error type produced by user supplied callbacks (retrieval, bulk retrieval).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// == Cache Operation ==
/// The backend operation that was running when a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOperation {
    /// Reading a value
    Get,
    /// Writing a value
    Set,
    /// Removing a value
    Remove,
    /// Refreshing the validation timestamp of a value
    MarkValidated,
}

impl fmt::Display for CacheOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheOperation::Get => "get",
            CacheOperation::Set => "set",
            CacheOperation::Remove => "remove",
            CacheOperation::MarkValidated => "mark_validated",
        };
        f.write_str(name)
    }
}

// == Backend Error ==
/// A failure raised by a cache backend, tagged with the failing operation.
#[derive(Error, Debug)]
#[error("cache backend {operation} failed: {source}")]
pub struct CacheBackendError {
    /// Operation that failed
    pub operation: CacheOperation,
    /// Underlying cause reported by the backend
    #[source]
    pub source: BoxError,
}

impl CacheBackendError {
    /// Creates a backend error for `operation` wrapping `cause`.
    pub fn new(operation: CacheOperation, cause: impl Into<BoxError>) -> Self {
        Self {
            operation,
            source: cause.into(),
        }
    }
}

// == Cache Error Enum ==
/// Unified error type for the cache strategy engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A backend operation failed and no exception handler accepted it
    #[error(transparent)]
    Backend(#[from] CacheBackendError),

    /// A call descriptor could not be turned into a cache key
    #[error("Unsupported operation descriptor: {0}")]
    UnsupportedOperationDescriptor(String),

    /// The retrieval callback failed and the failure was not handled
    #[error(transparent)]
    Retrieval(BoxError),
}

impl CacheError {
    /// Returns the original retrieval error, if this is a retrieval failure.
    ///
    /// Callers can downcast the returned error to the concrete type their
    /// retrieval callback produced.
    pub fn retrieval_cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            CacheError::Retrieval(cause) => Some(cause.as_ref()),
            _ => None,
        }
    }

    /// Returns the backend error, if this is a backend failure.
    pub fn backend_error(&self) -> Option<&CacheBackendError> {
        match self {
            CacheError::Backend(err) => Some(err),
            _ => None,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache strategy engine.
pub type Result<T> = std::result::Result<T, CacheError>;
