//! Per-modality circuit breaker.
//!
//! When one modality's backend keeps failing, its circuit opens and new
//! units for that modality fail fast with `ProcessingError::CircuitOpen`
//! instead of waiting out another timeout. The adjudicator still runs
//! with whatever the other modalities produced.

use std::collections::HashMap;
use std::time::Duration;

use claimsight_core::Modality;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::human_duration;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,

    /// Time before a probe is let through
    #[serde(with = "human_duration")]
    pub recovery_timeout: Duration,

    /// Probe successes needed to close
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CircuitState {
    Closed { failures: u32 },

    /// Units fail fast until the recovery timeout passes
    Open { opened_at: Instant },

    HalfOpen { successes: u32 },
}

/// One circuit per modality, so modalities recover independently.
#[derive(Debug)]
pub struct CircuitBreaker {
    states: RwLock<HashMap<Modality, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// True when units of this modality should fail fast.
    pub fn is_open(&self, modality: Modality) -> bool {
        let states = self.states.read();
        match states.get(&modality) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    drop(states);
                    self.transition_to_half_open(modality);
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    pub fn record_success(&self, modality: Modality) {
        let mut states = self.states.write();
        match states.get(&modality).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(modality, CircuitState::Closed { failures: 0 });
                    tracing::info!(%modality, "Circuit closed after successful probe");
                } else {
                    states.insert(
                        modality,
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { .. }) => {
                states.insert(modality, CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    pub fn record_failure(&self, modality: Modality) {
        let mut states = self.states.write();
        let failures = match states.get(&modality).cloned() {
            Some(CircuitState::Closed { failures }) => failures + 1,
            None => 1,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    modality,
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(%modality, "Circuit reopened after failed probe");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
        };

        if failures >= self.config.failure_threshold {
            states.insert(
                modality,
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::warn!(%modality, failures, "Circuit opened after repeated failures");
        } else {
            states.insert(modality, CircuitState::Closed { failures });
        }
    }

    fn transition_to_half_open(&self, modality: Modality) {
        let mut states = self.states.write();
        if matches!(states.get(&modality), Some(CircuitState::Open { .. })) {
            states.insert(modality, CircuitState::HalfOpen { successes: 0 });
            tracing::info!(%modality, "Circuit half-open, letting a probe through");
        }
    }

    pub fn state(&self, modality: Modality) -> CircuitState {
        self.states
            .read()
            .get(&modality)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout: Duration::from_secs(10),
            success_threshold: 1,
        })
    }

    #[test]
    fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::default();
        assert!(!cb.is_open(Modality::Visual));
        assert_eq!(cb.state(Modality::Visual), CircuitState::Closed { failures: 0 });
    }

    #[test]
    fn test_circuit_opens_after_threshold() {
        let cb = breaker(2);
        cb.record_failure(Modality::Audio);
        assert!(!cb.is_open(Modality::Audio));
        cb.record_failure(Modality::Audio);
        assert!(cb.is_open(Modality::Audio));
    }

    #[test]
    fn test_success_resets_failures() {
        let cb = breaker(3);
        cb.record_failure(Modality::Video);
        cb.record_failure(Modality::Video);
        cb.record_success(Modality::Video);
        cb.record_failure(Modality::Video);
        cb.record_failure(Modality::Video);
        assert!(!cb.is_open(Modality::Video));
    }

    #[test]
    fn test_modalities_are_independent() {
        let cb = breaker(1);
        cb.record_failure(Modality::Visual);
        assert!(cb.is_open(Modality::Visual));
        assert!(!cb.is_open(Modality::Audio));
        assert!(!cb.is_open(Modality::Video));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_after_timeout() {
        let cb = breaker(1);
        cb.record_failure(Modality::Visual);
        assert!(cb.is_open(Modality::Visual));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!cb.is_open(Modality::Visual));
        assert_eq!(cb.state(Modality::Visual), CircuitState::HalfOpen { successes: 0 });

        cb.record_success(Modality::Visual);
        assert_eq!(cb.state(Modality::Visual), CircuitState::Closed { failures: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_reopens() {
        let cb = breaker(1);
        cb.record_failure(Modality::Audio);
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!cb.is_open(Modality::Audio));

        cb.record_failure(Modality::Audio);
        assert!(cb.is_open(Modality::Audio));
    }
}
