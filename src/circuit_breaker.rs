/*!
 * # Circuit Breaker
 *
 * Guards calls to third-party HTTP APIs (OpenAI, Stripe). After
 * `failure_threshold` upstream failures the circuit opens and calls fail fast
 * with [`ServiceError::CircuitBreakerOpen`] until `timeout` has passed.
 */

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::errors::ServiceError;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Requests are rejected
    Open,
    /// Limited trial requests test for recovery
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Maximum number of failures before opening the circuit
    pub failure_threshold: u32,
    /// Duration to wait before transitioning from Open to HalfOpen
    pub timeout: Duration,
    /// Number of successful requests needed in HalfOpen to close the circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct CircuitBreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    state: Mutex<CircuitBreakerState>,
}

/// Errors that say something about the upstream's health. Client-side
/// problems (bad key, rate limit, invalid input) leave the circuit alone.
fn is_upstream_failure(err: &ServiceError) -> bool {
    matches!(
        err,
        ServiceError::ExternalServiceError(_) | ServiceError::ServiceUnavailable(_)
    )
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            state: Mutex::new(CircuitBreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_time: None,
            }),
        }
    }

    /// Execute an async call with circuit breaker protection
    pub async fn call<F, Fut, R>(&self, f: F) -> Result<R, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, ServiceError>>,
    {
        if !self.can_execute() {
            return Err(ServiceError::CircuitBreakerOpen);
        }

        let result = f().await;
        match &result {
            Ok(_) => self.on_success(),
            Err(err) if is_upstream_failure(err) => self.on_failure(),
            Err(_) => {}
        }
        result
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CircuitBreakerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn can_execute(&self) -> bool {
        let mut state = self.lock();

        match state.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => match state.last_failure_time {
                Some(last_failure) if last_failure.elapsed() >= self.config.timeout => {
                    state.state = CircuitState::HalfOpen;
                    state.success_count = 0;
                    true
                }
                _ => false,
            },
        }
    }

    fn on_success(&self) {
        let mut state = self.lock();

        match state.state {
            CircuitState::Closed => {
                state.failure_count = 0;
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    info!(breaker = self.name, "circuit closed");
                    state.state = CircuitState::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                    state.last_failure_time = None;
                }
            }
        }
    }

    fn on_failure(&self) {
        let mut state = self.lock();

        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());

        match state.state {
            CircuitState::Closed if state.failure_count >= self.config.failure_threshold => {
                warn!(
                    breaker = self.name,
                    failures = state.failure_count,
                    "circuit opened"
                );
                state.state = CircuitState::Open;
            }
            CircuitState::HalfOpen => {
                warn!(breaker = self.name, "trial request failed; circuit re-opened");
                state.state = CircuitState::Open;
                state.success_count = 0;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: 2,
                timeout,
                success_threshold: 1,
            },
        )
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), ServiceError> {
        cb.call(|| async { Err::<(), _>(ServiceError::ExternalServiceError("502".into())) })
            .await
    }

    #[tokio::test]
    async fn opens_after_threshold_and_fails_fast() {
        let cb = breaker(Duration::from_secs(60));
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        let result = cb.call(|| async { Ok::<_, ServiceError>(1) }).await;
        assert!(matches!(result, Err(ServiceError::CircuitBreakerOpen)));
    }

    #[tokio::test]
    async fn client_errors_do_not_trip_the_breaker() {
        let cb = breaker(Duration::from_secs(60));
        for _ in 0..5 {
            let _ = cb
                .call(|| async { Err::<(), _>(ServiceError::Unauthorized("bad key".into())) })
                .await;
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_trial_closes_on_success() {
        let cb = breaker(Duration::from_millis(0));
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        let value = cb.call(|| async { Ok::<_, ServiceError>(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
