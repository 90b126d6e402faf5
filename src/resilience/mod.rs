//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to an unreliable operation:
//!     → circuit_breaker.rs (admit, or serve fallback while open)
//!     → timeouts.rs (enforce per-call deadline)
//!     → circuit_breaker.rs (record success/failure, transition state)
//!
//! HTTP attempt against the shop API:
//!     → retries.rs (classify status, pick wait)
//!     → backoff.rs (exponential delay + jitter)
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline
//! - Unsafe methods retry on 429 only with an idempotency key
//! - The breaker sees only the overall outcome of a retried request

pub mod backoff;
pub mod circuit_breaker;
pub mod registry;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerError, BreakerSnapshot, CircuitBreaker, CircuitState, Fallback};
pub use registry::BreakerRegistry;
