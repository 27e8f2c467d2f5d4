//! # Circuit Breaker
//!
//! Guards outbound probes against a collaborator that has started failing.
//! Three states: Closed (calls pass), Open (calls fail fast until the cool-down
//! elapses) and Half-Open (a limited number of trial calls decide recovery).
//! Every guarded call is also bounded by the breaker's call timeout; an elapsed
//! timeout counts as a failure.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Cool-down before a half-open trial is allowed
    #[serde(with = "duration_millis")]
    pub recovery_timeout: Duration,
    /// Successful trials needed to close again
    pub success_threshold: u32,
    /// Upper bound on a single guarded call
    #[serde(with = "duration_millis")]
    pub call_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
            call_timeout: Duration::from_millis(crate::constants::timeouts::ASSET_PROBE_TIMEOUT_MS),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    #[error("Call to {component} timed out after {timeout:?}")]
    Timeout { component: String, timeout: Duration },

    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

/// Point-in-time counters for one breaker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub timeout_count: u64,
    pub rejected_count: u64,
    pub consecutive_failures: u64,
}

#[derive(Debug, Default)]
struct Bookkeeping {
    total_calls: u64,
    success_count: u64,
    failure_count: u64,
    timeout_count: u64,
    rejected_count: u64,
    consecutive_failures: u64,
    half_open_calls: u64,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    state: AtomicU8,
    config: CircuitBreakerConfig,
    book: Mutex<Bookkeeping>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_ms = config.recovery_timeout.as_millis() as u64,
            call_timeout_ms = config.call_timeout.as_millis() as u64,
            "Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            book: Mutex::new(Bookkeeping::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Execute `operation` under the breaker, bounded by the call timeout
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_acquire() {
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        }

        let started = Instant::now();
        match tokio::time::timeout(self.config.call_timeout, operation()).await {
            Ok(Ok(value)) => {
                self.record_success(started.elapsed());
                Ok(value)
            }
            Ok(Err(error)) => {
                self.record_failure(false);
                Err(CircuitBreakerError::OperationFailed(error))
            }
            Err(_) => {
                self.record_failure(true);
                Err(CircuitBreakerError::Timeout {
                    component: self.name.clone(),
                    timeout: self.config.call_timeout,
                })
            }
        }
    }

    fn try_acquire(&self) -> bool {
        let mut book = self.book.lock();
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = book
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.config.recovery_timeout);
                if cooled_down {
                    self.state.store(CircuitState::HalfOpen as u8, Ordering::Release);
                    book.half_open_calls = 1;
                    info!(component = %self.name, "Circuit breaker half-open (testing recovery)");
                    true
                } else {
                    book.rejected_count += 1;
                    false
                }
            }
            CircuitState::HalfOpen => {
                if book.half_open_calls < u64::from(self.config.success_threshold) {
                    book.half_open_calls += 1;
                    true
                } else {
                    book.rejected_count += 1;
                    false
                }
            }
        }
    }

    fn record_success(&self, duration: Duration) {
        let mut book = self.book.lock();
        book.total_calls += 1;
        book.success_count += 1;
        book.consecutive_failures = 0;

        debug!(component = %self.name, duration_ms = duration.as_millis() as u64, "Guarded call succeeded");

        if self.state() == CircuitState::HalfOpen
            && book.half_open_calls >= u64::from(self.config.success_threshold)
        {
            self.state.store(CircuitState::Closed as u8, Ordering::Release);
            book.half_open_calls = 0;
            book.opened_at = None;
            info!(component = %self.name, "Circuit breaker closed (recovered)");
        }
    }

    fn record_failure(&self, timed_out: bool) {
        let mut book = self.book.lock();
        book.total_calls += 1;
        book.failure_count += 1;
        book.consecutive_failures += 1;
        if timed_out {
            book.timeout_count += 1;
        }

        let should_open = match self.state() {
            CircuitState::Closed => {
                book.consecutive_failures >= u64::from(self.config.failure_threshold)
            }
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };

        if should_open {
            self.state.store(CircuitState::Open as u8, Ordering::Release);
            book.opened_at = Some(Instant::now());
            book.half_open_calls = 0;
            warn!(
                component = %self.name,
                consecutive_failures = book.consecutive_failures,
                "Circuit breaker opened (failing fast)"
            );
        }
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let book = self.book.lock();
        CircuitBreakerMetrics {
            state: self.state(),
            total_calls: book.total_calls,
            success_count: book.success_count,
            failure_count: book.failure_count,
            timeout_count: book.timeout_count,
            rejected_count: book.rejected_count,
            consecutive_failures: book.consecutive_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(failure_threshold: u32, recovery_ms: u64, success_threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout: Duration::from_millis(recovery_ms),
            success_threshold,
            call_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_normal_operation() {
        let circuit = CircuitBreaker::new("caption_probe", config(3, 100, 1));
        let result = circuit.call(|| async { Ok::<_, String>("ok") }).await;
        assert_eq!(result.unwrap(), "ok");

        let metrics = circuit.metrics();
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_opens_after_threshold_and_fails_fast() {
        let circuit = CircuitBreaker::new("caption_probe", config(2, 10_000, 1));
        let _ = circuit.call(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(circuit.state(), CircuitState::Closed);
        let _ = circuit.call(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        let result = circuit.call(|| async { Ok::<_, String>("never") }).await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen { .. })));
        assert_eq!(circuit.metrics().rejected_count, 1);
    }

    #[tokio::test]
    async fn test_recovers_through_half_open() {
        let circuit = CircuitBreaker::new("caption_probe", config(1, 20, 1));
        let _ = circuit.call(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;
        circuit.call(|| async { Ok::<_, String>(()) }).await.unwrap();
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let circuit = CircuitBreaker::new(
            "caption_probe",
            CircuitBreakerConfig {
                call_timeout: Duration::from_millis(10),
                ..config(1, 10_000, 1)
            },
        );
        let result = circuit
            .call(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, String>(())
            })
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::Timeout { .. })));
        assert_eq!(circuit.state(), CircuitState::Open);
        assert_eq!(circuit.metrics().timeout_count, 1);
    }
}
