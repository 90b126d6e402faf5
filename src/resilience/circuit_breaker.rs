//! Circuit breaker for unreliable remote operations.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls get the fallback immediately
//! - Half-Open: trial calls decide whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: reset_timeout elapsed since opening (checked on the next call)
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails (no threshold check)
//! ```
//!
//! # Design Decisions
//! - One mutex guards state, counter, open instant and trial slot; the whole
//!   read-increment-compare-transition sequence runs under it
//! - The lock is never held across an await or while the hook runs
//! - Timeouts and operation errors are the same failure for breaker policy
//! - Open returns a degraded value instead of an error
//! - Half-Open admits every concurrent caller unless `single_trial` is set
//! - With `single_trial`, the slot belongs to one trial id until that trial
//!   finishes or is cancelled, even across a re-open

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::observability::hook::{payload, MetricsHook};
use crate::resilience::timeouts::{with_deadline, DeadlineError};

/// Circuit state. Discriminants match the `resilience_circuit_state` gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(s)
    }
}

/// A placeholder value served instead of calling a known-bad dependency.
pub trait Fallback {
    /// Build the degraded value. `label` is the breaker's configured model name.
    fn fallback(label: Option<&str>) -> Self;
}

/// `None` stands in for a value the open circuit could not fetch.
impl<T> Fallback for Option<T> {
    fn fallback(_label: Option<&str>) -> Self {
        None
    }
}

/// A failure that the breaker passes back to the caller.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The call exceeded its deadline.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The operation itself failed.
    #[error("call failed: {0}")]
    Operation(E),
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub open_for_secs: Option<f64>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Id of the trial holding the single-trial slot.
    trial: Option<u64>,
    next_trial: u64,
}

enum Admission {
    Proceed { trial: Option<u64> },
    Reject,
}

/// Timeout-enforcing circuit breaker around an async operation.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerState>,
    hook: MetricsHook,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial: None,
                next_trial: 0,
            }),
            hook: MetricsHook::noop(),
        }
    }

    /// Attach an observability hook.
    pub fn with_hook(mut self, hook: MetricsHook) -> Self {
        self.hook = hook;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state. Does not perform the Open → Half-Open check.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            open_for_secs: match inner.state {
                CircuitState::Open => inner.opened_at.map(|t| t.elapsed().as_secs_f64()),
                _ => None,
            },
        }
    }

    /// Run `operation` through the breaker.
    ///
    /// `timeout` overrides the configured per-call deadline. While the circuit is
    /// open the operation is not invoked and `T::fallback` is returned. A failure
    /// that leaves the circuit open is also answered with the fallback; other
    /// failures are returned to the caller.
    pub async fn execute<T, E, F, Fut>(
        &self,
        operation: F,
        timeout: Option<Duration>,
    ) -> Result<T, BreakerError<E>>
    where
        T: Fallback,
        E: fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let trial = match self.admit() {
            Admission::Proceed { trial } => trial,
            Admission::Reject => {
                tracing::warn!(
                    breaker = %self.name,
                    "Circuit is open; serving fallback without calling operation"
                );
                return Ok(self.fallback());
            }
        };
        let _trial = trial.map(|id| TrialGuard { breaker: self, id });

        let deadline = timeout.unwrap_or_else(|| self.config.call_timeout());
        let error = match with_deadline(deadline, operation()).await {
            Ok(value) => {
                self.record_success();
                return Ok(value);
            }
            Err(DeadlineError::Elapsed(d)) => {
                tracing::warn!(breaker = %self.name, timeout = ?d, "Operation timed out");
                BreakerError::Timeout(d)
            }
            Err(DeadlineError::Failed(e)) => {
                tracing::warn!(breaker = %self.name, error = %e, "Operation failed");
                BreakerError::Operation(e)
            }
        };

        if self.record_failure() {
            return Ok(self.fallback());
        }
        Err(error)
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> Admission {
        let mut half_opened = false;
        let admission = {
            let mut inner = self.lock();

            if inner.state == CircuitState::Open {
                let elapsed = inner.opened_at.map_or(Duration::MAX, |t| t.elapsed());
                if elapsed >= self.config.reset_timeout() {
                    inner.state = CircuitState::HalfOpen;
                    half_opened = true;
                }
            }

            match inner.state {
                CircuitState::Open => Admission::Reject,
                CircuitState::HalfOpen if self.config.single_trial => {
                    if inner.trial.is_some() {
                        Admission::Reject
                    } else {
                        let id = inner.next_trial;
                        inner.next_trial = id.wrapping_add(1);
                        inner.trial = Some(id);
                        Admission::Proceed { trial: Some(id) }
                    }
                }
                _ => Admission::Proceed { trial: None },
            }
        };

        if half_opened {
            tracing::info!(
                breaker = %self.name,
                "Circuit breaker transitioned to HALF_OPEN (trial)"
            );
            self.emit("circuit_half_open", json!({}));
        }
        admission
    }

    fn record_success(&self) {
        let previous = {
            let mut inner = self.lock();
            let previous = inner.state;
            inner.consecutive_failures = 0;
            inner.state = CircuitState::Closed;
            inner.opened_at = None;
            previous
        };

        if previous != CircuitState::Closed {
            tracing::info!(
                breaker = %self.name,
                from = %previous,
                "Circuit breaker reset to CLOSED after successful call"
            );
            self.emit("circuit_reset", json!({}));
        }
    }

    /// Returns true if the circuit is open after recording.
    fn record_failure(&self) -> bool {
        let (failures, opened, now_open) = {
            let mut inner = self.lock();
            inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
            let failures = inner.consecutive_failures;

            let trip = inner.state == CircuitState::HalfOpen
                || failures >= self.config.failure_threshold;
            let opened = trip && inner.state != CircuitState::Open;
            if trip {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            (failures, opened, inner.state == CircuitState::Open)
        };

        tracing::debug!(breaker = %self.name, failures, "Circuit failure count incremented");
        self.emit("circuit_failure", json!({ "failures": failures }));

        if opened {
            tracing::warn!(breaker = %self.name, failures, "Circuit breaker opened");
            self.emit("circuit_open", json!({ "failures": failures }));
        }
        now_open
    }

    fn fallback<T: Fallback>(&self) -> T {
        let model = self.config.model_name.as_deref();
        tracing::warn!(breaker = %self.name, model = ?model, "Returning fallback response");
        self.emit("inference_fallback", json!({ "model": model }));
        T::fallback(model)
    }

    fn emit(&self, event: &str, body: serde_json::Value) {
        let mut body = payload(body);
        body.insert("breaker".to_string(), self.name.clone().into());
        self.hook.emit(event, body);
    }
}

/// Releases the single half-open trial slot, including when the call is cancelled.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    id: u64,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.breaker.lock();
        if inner.trial == Some(self.id) {
            inner.trial = None;
        }
    }
}
