//! Execution Module
//!
//! The protocol engine that runs a strategy against a backend, the backend
//! exception handler, and the circuit breaker guarding it.

mod circuit_breaker;
mod handler;
mod plan;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerState, DEFAULT_COOLDOWN, DEFAULT_FAILURE_THRESHOLD,
};
pub use handler::{CacheExceptionHandler, HandleAll, RethrowAll};
pub use plan::{CircuitBreakerPlan, ExecutionPlan};
