//! Resilience layer for calls to external dependencies.
//!
//! A timeout-enforcing circuit breaker for inference backends and a retrying
//! client for the shop Admin API, with structured logging and metrics.

pub mod config;
pub mod inference;
pub mod observability;
pub mod resilience;
pub mod shop;

pub use config::schema::ResilienceConfig;
pub use observability::MetricsHook;
pub use resilience::{BreakerError, CircuitBreaker, CircuitState, Fallback};
pub use shop::RetryingClient;
