//! Configuration Module
//!
//! Loads engine defaults from environment variables.

use std::env;
use std::time::Duration;

use crate::cache::Expiration;
use crate::execution::{CircuitBreaker, DEFAULT_COOLDOWN, DEFAULT_FAILURE_THRESHOLD};

/// Engine configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Default sliding expiration in seconds; 0 disables expiration
    pub sliding_expiration: u64,
    /// Handled backend failures before the circuit opens
    pub circuit_breaker_threshold: u32,
    /// Seconds the circuit stays open
    pub circuit_breaker_cooldown: u64,
    /// Seconds between expiration sweeps of the in-memory backend
    pub cleanup_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_SLIDING_EXPIRATION` - Default sliding window in seconds (default: 0, never)
    /// - `CIRCUIT_BREAKER_THRESHOLD` - Failures before breaking (default: 5)
    /// - `CIRCUIT_BREAKER_COOLDOWN` - Break duration in seconds (default: 5)
    /// - `CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 1)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sliding_expiration: env_or("CACHE_SLIDING_EXPIRATION", defaults.sliding_expiration),
            circuit_breaker_threshold: env_or(
                "CIRCUIT_BREAKER_THRESHOLD",
                defaults.circuit_breaker_threshold,
            ),
            circuit_breaker_cooldown: env_or(
                "CIRCUIT_BREAKER_COOLDOWN",
                defaults.circuit_breaker_cooldown,
            ),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
        }
    }

    /// The expiration policy strategies get unless they set their own.
    pub fn default_expiration(&self) -> Expiration {
        match self.sliding_expiration {
            0 => Expiration::never(),
            secs => Expiration::sliding(Duration::from_secs(secs)),
        }
    }

    /// A fresh, closed circuit breaker with the configured limits.
    pub fn circuit_breaker(&self) -> CircuitBreaker {
        CircuitBreaker::new(
            self.circuit_breaker_threshold,
            Duration::from_secs(self.circuit_breaker_cooldown),
        )
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sliding_expiration: 0,
            circuit_breaker_threshold: DEFAULT_FAILURE_THRESHOLD,
            circuit_breaker_cooldown: DEFAULT_COOLDOWN.as_secs(),
            cleanup_interval: 1,
        }
    }
}
