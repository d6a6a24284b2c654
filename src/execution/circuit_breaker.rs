//! Circuit Breaker
//!
//! Stops talking to a failing backend for a cooldown window once enough
//! handled failures have piled up.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::info;

use crate::error::CacheBackendError;

/// Default number of handled failures before the circuit opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time the circuit stays open.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);

// == Circuit Breaker State ==
/// Shared breaker state consulted by guarded execution plans.
pub trait CircuitBreakerState: Send + Sync {
    /// True while backend calls must be skipped.
    fn is_open(&self) -> bool;

    /// Records a handled backend failure, possibly opening the circuit.
    fn try_break(&self, error: CacheBackendError);

    /// Records a successful run: clears the failure count and closes the circuit.
    fn reset(&self);
}

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    blocked_until: Option<DateTime<Utc>>,
    last_error: Option<Arc<CacheBackendError>>,
}

// == Circuit Breaker ==
/// Opens after `threshold` consecutive handled failures and stays open for
/// `cooldown`. All state lives behind one mutex.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }
}

impl CircuitBreaker {
    /// Creates a closed breaker. A threshold of 0 behaves like 1.
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Handled failures counted since the last reset.
    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }

    /// When the current open period ends, if the circuit has been opened.
    pub fn blocked_until(&self) -> Option<DateTime<Utc>> {
        self.state.lock().blocked_until
    }

    /// The most recent failure passed to `try_break`.
    pub fn last_error(&self) -> Option<Arc<CacheBackendError>> {
        self.state.lock().last_error.clone()
    }

    fn open_until(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.cooldown)
            .ok()
            .and_then(|cooldown| now.checked_add_signed(cooldown))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl CircuitBreakerState for CircuitBreaker {
    fn is_open(&self) -> bool {
        let state = self.state.lock();
        matches!(state.blocked_until, Some(until) if Utc::now() < until)
    }

    fn try_break(&self, error: CacheBackendError) {
        let mut state = self.state.lock();
        state.last_error = Some(Arc::new(error));
        state.failure_count = state.failure_count.saturating_add(1);

        if state.failure_count >= self.threshold {
            let until = self.open_until(Utc::now());
            state.blocked_until = Some(until);
            info!(
                failures = state.failure_count,
                until = %until,
                "Circuit opened; backend calls suspended"
            );
        }
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        if state.blocked_until.is_some() {
            info!("Circuit closed; backend calls resumed");
        }
        state.failure_count = 0;
        state.blocked_until = None;
        state.last_error = None;
    }
}

impl<T: CircuitBreakerState + ?Sized> CircuitBreakerState for Arc<T> {
    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn try_break(&self, error: CacheBackendError) {
        (**self).try_break(error)
    }

    fn reset(&self) {
        (**self).reset()
    }
}
