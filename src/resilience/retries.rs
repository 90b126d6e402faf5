//! Retry logic.
//!
//! # Responsibilities
//! - Classify each upstream attempt as success, retriable, or terminal
//! - Pick the wait before the next attempt (server hint or computed backoff)
//!
//! # Design Decisions
//! - 5xx and network errors are always retriable
//! - 429 is retriable for safe methods; unsafe methods need an idempotency key
//! - Classification is a pure function over (method, status, key presence)
//! - `Retry-After` is honored only as integer seconds

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, StatusCode};

use crate::resilience::backoff::calculate_backoff;

/// Outcome of a single attempt that produced an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 2xx: hand the response to the caller.
    Success,
    /// Transient: sleep and try again if attempts remain.
    Retriable(StatusCode),
    /// Permanent: surface immediately.
    Terminal(StatusCode),
}

/// How long to wait before the next attempt, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Server-directed delay from `Retry-After`.
    RetryAfter(Duration),
    /// Exponential backoff with jitter.
    Backoff(Duration),
}

impl Wait {
    pub fn duration(&self) -> Duration {
        match *self {
            Wait::RetryAfter(d) | Wait::Backoff(d) => d,
        }
    }
}

/// GET, HEAD and OPTIONS.
pub fn is_safe_method(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS
}

/// Whether a non-2xx status may be retried.
pub fn should_retry(method: &Method, status: StatusCode, has_idempotency_key: bool) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return is_safe_method(method) || has_idempotency_key;
    }
    status.is_server_error()
}

/// Classify the status of one attempt.
pub fn classify(method: &Method, status: StatusCode, has_idempotency_key: bool) -> AttemptOutcome {
    if status.is_success() {
        AttemptOutcome::Success
    } else if should_retry(method, status, has_idempotency_key) {
        AttemptOutcome::Retriable(status)
    } else {
        AttemptOutcome::Terminal(status)
    }
}

/// Parse an integer-seconds `Retry-After` header.
///
/// HTTP-date and other non-integer values yield `None`.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Wait before the attempt following `attempt` (1-based).
pub fn next_wait(attempt: u32, base: Duration, headers: Option<&HeaderMap>) -> Wait {
    match headers.and_then(parse_retry_after) {
        Some(hint) => Wait::RetryAfter(hint),
        None => Wait::Backoff(calculate_backoff(attempt, base)),
    }
}
