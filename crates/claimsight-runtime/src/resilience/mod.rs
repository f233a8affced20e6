//! Resilience and accounting around model calls.
//!
//! - Per-modality circuit breaker
//! - Per-case token usage and cost

mod circuit_breaker;
mod usage;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use usage::{estimate_cost, UsageTracker};
