//! Cache Module
//!
//! The entry model, the backend contract the engine depends on, and the
//! in-memory backend adapter.

mod backend;
mod entry;
mod failing;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use backend::{BackendResult, CacheBackend, CacheValue};
pub use entry::{CachedEntry, Expiration, ValidationResult, UNPERSISTED_VERSION};
pub use failing::FailingBackend;
pub use stats::CacheStats;
pub use store::MemoryBackend;
