//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Deterministic part of the delay before retrying after `attempt`.
///
/// `attempt` is 1-based: the first retry waits `base`, the second `2 * base`, and so on.
pub fn backoff_floor(attempt: u32, base: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let factor = 2u32.saturating_pow(attempt - 1);
    base.checked_mul(factor).unwrap_or(Duration::MAX)
}

/// Calculate exponential backoff with up to one extra unit of uniform jitter.
///
/// The result lies in `[base * 2^(attempt-1), 2 * base * 2^(attempt-1)]`.
pub fn calculate_backoff(attempt: u32, base: Duration) -> Duration {
    let floor = backoff_floor(attempt, base);
    if floor.is_zero() {
        return floor;
    }

    let jitter_secs = rand::thread_rng().gen_range(0.0..=floor.as_secs_f64());
    let jitter = Duration::try_from_secs_f64(jitter_secs).unwrap_or(Duration::ZERO);
    floor.saturating_add(jitter).min(floor.saturating_mul(2))
}
