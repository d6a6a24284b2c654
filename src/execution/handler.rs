//! Backend Exception Handlers
//!
//! Decide whether a backend failure is absorbed by the engine or returned to
//! the caller.

use crate::error::CacheBackendError;

/// Offered every backend failure before it propagates.
///
/// Returning `true` marks the failure as handled: the engine degrades instead
/// of returning the error. Returning `false` lets the error propagate as-is.
pub trait CacheExceptionHandler: Send + Sync {
    fn try_handle(&self, error: &CacheBackendError) -> bool;
}

/// Handles nothing; every backend failure reaches the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct RethrowAll;

impl CacheExceptionHandler for RethrowAll {
    fn try_handle(&self, _error: &CacheBackendError) -> bool {
        false
    }
}

/// Handles every backend failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandleAll;

impl CacheExceptionHandler for HandleAll {
    fn try_handle(&self, _error: &CacheBackendError) -> bool {
        true
    }
}

impl<F> CacheExceptionHandler for F
where
    F: Fn(&CacheBackendError) -> bool + Send + Sync,
{
    fn try_handle(&self, error: &CacheBackendError) -> bool {
        self(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheOperation;

    #[test]
    fn test_builtin_handlers() {
        let err = CacheBackendError::new(CacheOperation::Get, "down");
        assert!(!RethrowAll.try_handle(&err));
        assert!(HandleAll.try_handle(&err));
    }

    #[test]
    fn test_predicate_handler() {
        let only_writes = |e: &CacheBackendError| e.operation == CacheOperation::Set;

        assert!(only_writes.try_handle(&CacheBackendError::new(CacheOperation::Set, "x")));
        assert!(!only_writes.try_handle(&CacheBackendError::new(CacheOperation::Get, "x")));
    }
}
