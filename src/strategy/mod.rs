//! Strategy Module
//!
//! Fluent descriptions of cacheable operations. A strategy starts out
//! incomplete (key material only) and becomes typed once a retrieval
//! callback or a value type is attached.

/// Fluent key-material setters shared by every strategy type.
///
/// Expects the implementing type to have a `target: StrategyTarget<B>` field.
macro_rules! key_builders {
    () => {
        /// Sets the region the key is scoped to.
        pub fn with_region(mut self, region: impl Into<String>) -> Self {
            self.target.material.region = region.into();
            self
        }

        /// Replaces the key parameters. Order is part of the key.
        pub fn with_parameters<I, P>(mut self, parameters: I) -> Self
        where
            I: IntoIterator<Item = P>,
            P: Into<$crate::keys::ParamValue>,
        {
            self.target.material.parameters = parameters.into_iter().map(Into::into).collect();
            self
        }

        /// Appends one key parameter.
        pub fn with_parameter(mut self, parameter: impl Into<$crate::keys::ParamValue>) -> Self {
            self.target.material.parameters.push(parameter.into());
            self
        }

        /// Expires entries that go unaccessed for longer than `window`.
        pub fn expire_after(mut self, window: std::time::Duration) -> Self {
            self.target.expiration = $crate::cache::Expiration::sliding(window);
            self
        }

        /// The full cache key this strategy reads and writes.
        pub fn key(&self) -> String {
            self.target.key()
        }

        pub fn region(&self) -> &str {
            &self.target.material.region
        }

        pub fn expiration(&self) -> $crate::cache::Expiration {
            self.target.expiration
        }
    };
}

mod async_strategy;
mod bulk;
mod callbacks;
mod incomplete;
mod single;
mod target;

pub use async_strategy::CacheStrategyAsync;
pub use bulk::{
    BulkCacheStrategy, BulkCacheStrategyAsync, BulkCacheStrategyIncomplete, BulkKey,
    BulkRetrieveFn, AsyncBulkRetrieveFn,
};
pub use callbacks::{
    AsyncCallbacks, AsyncRetrieveFn, AsyncValidateFn, Callbacks, RetrievalErrorFn,
    RetrievalErrorResult, RetrieveFn, ValidateFn,
};
pub use incomplete::CacheStrategyIncomplete;
pub use single::CacheStrategy;
pub(crate) use target::StrategyTarget;
