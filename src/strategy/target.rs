//! Strategy Target
//!
//! The part every strategy shares: the cache it talks to, its key material
//! and its expiration policy.

use crate::cache::{CacheBackend, Expiration};
use crate::client::StrategyCache;
use crate::keys::KeyMaterial;

pub(crate) struct StrategyTarget<B> {
    pub(crate) cache: StrategyCache<B>,
    pub(crate) material: KeyMaterial,
    pub(crate) expiration: Expiration,
}

impl<B> Clone for StrategyTarget<B> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            material: self.material.clone(),
            expiration: self.expiration,
        }
    }
}

impl<B: CacheBackend> StrategyTarget<B> {
    pub(crate) fn new(cache: StrategyCache<B>, material: KeyMaterial) -> Self {
        let expiration = cache.default_expiration();
        Self {
            cache,
            material,
            expiration,
        }
    }

    pub(crate) fn key(&self) -> String {
        self.cache.key_deriver().key(&self.material)
    }

    pub(crate) fn region(&self) -> &str {
        &self.material.region
    }
}
