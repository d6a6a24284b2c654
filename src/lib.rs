//! Strategy Cache - a caching strategy execution engine
//!
//! Describes "what to cache" as a fluent strategy (key, region, parameters,
//! expiration, validation and retrieval callbacks) and runs the
//! get / validate / retrieve / set protocol against any backend that
//! implements [`CacheBackend`].
//!
//! ```ignore
//! let cache = StrategyCache::new(MemoryBackend::new());
//! let root = cache
//!     .with_key("Sqrt")
//!     .with_region("Math")
//!     .retrieve_using(|| Ok(2f64.sqrt()))
//!     .get_value()?;
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod execution;
pub mod keys;
pub mod strategy;
pub mod tasks;

pub use cache::{CacheBackend, CachedEntry, Expiration, FailingBackend, MemoryBackend, ValidationResult};
pub use client::StrategyCache;
pub use config::Config;
pub use error::{BoxError, CacheBackendError, CacheError, CacheOperation, Result};
pub use execution::{CacheExceptionHandler, CircuitBreaker, CircuitBreakerState, HandleAll, RethrowAll};
pub use keys::{CallDescriptor, ParamValue, Parameter, ParameterKeyProvider};
pub use strategy::{
    BulkCacheStrategy, BulkCacheStrategyAsync, BulkCacheStrategyIncomplete, CacheStrategy,
    CacheStrategyAsync, CacheStrategyIncomplete, RetrievalErrorResult,
};
pub use tasks::spawn_cleanup_task;
