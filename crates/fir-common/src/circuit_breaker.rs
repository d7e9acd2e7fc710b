//! Circuit breaker for calls to the fault-execution service

use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed,
    /// Circuit is open, requests fail fast
    Open,
    /// Circuit is half-open, one probe is allowed through
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Time the circuit stays open before admitting a probe
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    current: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker implementation
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: RwLock<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker in the closed state
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(BreakerState {
                current: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Check whether a call may be attempted. While open, this transitions
    /// to half-open once the recovery timeout has elapsed and admits that
    /// single probe.
    pub async fn can_attempt(&self) -> bool {
        let mut state = self.state.write().await;
        match state.current {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let recovered = state
                    .opened_at
                    .map(|t| t.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(false);
                if recovered {
                    info!("Circuit breaker '{}' transitioning to half-open", self.name);
                    state.current = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    /// Record a successful call
    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        match state.current {
            CircuitState::Closed => {
                state.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                info!("Circuit breaker '{}' closing after successful probe", self.name);
                state.current = CircuitState::Closed;
                state.consecutive_failures = 0;
                state.opened_at = None;
            }
            CircuitState::Open => {
                debug!(
                    "Circuit breaker '{}' recorded success while open",
                    self.name
                );
            }
        }
    }

    /// Record a failed call
    pub async fn record_failure(&self) {
        let mut state = self.state.write().await;
        state.consecutive_failures += 1;
        match state.current {
            CircuitState::Closed => {
                if state.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        "Circuit breaker '{}' opening after {} consecutive failures",
                        self.name, state.consecutive_failures
                    );
                    state.current = CircuitState::Open;
                    state.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                warn!(
                    "Circuit breaker '{}' reopening after failed probe",
                    self.name
                );
                state.current = CircuitState::Open;
                state.opened_at = Some(Instant::now());
            }
            CircuitState::Open => {
                debug!(
                    "Circuit breaker '{}' recorded failure while open",
                    self.name
                );
            }
        }
    }

    /// Current circuit state
    pub async fn state(&self) -> CircuitState {
        self.state.read().await.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn breaker(threshold: u32, recovery: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: recovery,
            },
        )
    }

    #[tokio::test]
    async fn starts_closed_and_allows_calls() {
        let cb = breaker(3, Duration::from_secs(60));
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert!(cb.can_attempt().await);
    }

    #[tokio::test]
    async fn opens_after_exactly_threshold_failures() {
        let cb = breaker(3, Duration::from_secs(60));

        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert!(cb.can_attempt().await);

        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.can_attempt().await);
    }

    #[tokio::test]
    async fn success_in_closed_resets_the_failure_count() {
        let cb = breaker(3, Duration::from_secs(60));

        cb.record_failure().await;
        cb.record_failure().await;
        cb.record_success().await;
        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn probe_is_admitted_after_the_recovery_timeout() {
        let cb = breaker(2, Duration::from_millis(50));

        cb.record_failure().await;
        cb.record_failure().await;
        assert!(!cb.can_attempt().await);

        sleep(Duration::from_millis(60)).await;

        assert!(cb.can_attempt().await);
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn successful_probe_closes_the_circuit() {
        let cb = breaker(2, Duration::from_millis(50));

        cb.record_failure().await;
        cb.record_failure().await;
        sleep(Duration::from_millis(60)).await;
        assert!(cb.can_attempt().await);

        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert!(cb.can_attempt().await);
    }

    #[tokio::test]
    async fn failed_probe_reopens_with_a_fresh_trip_time() {
        let cb = breaker(2, Duration::from_millis(50));

        cb.record_failure().await;
        cb.record_failure().await;
        sleep(Duration::from_millis(60)).await;
        assert!(cb.can_attempt().await);

        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.can_attempt().await);

        sleep(Duration::from_millis(60)).await;
        assert!(cb.can_attempt().await);
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
    }
}
