//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! CircuitBreaker / RetryingClient produce:
//!     → hook.rs (MetricsHook: injected (event, payload) callback)
//!     → tracing events (structured log fields)
//!
//! Consumers:
//!     → metrics.rs (prometheus_hook → counters, gauges → scrape endpoint)
//!     → logging.rs (stdout, pretty or JSON)
//! ```
//!
//! # Design Decisions
//! - The hook is optional; the default drops events
//! - Hook failures are contained and never change resilience behavior

pub mod hook;
pub mod logging;
pub mod metrics;

pub use hook::{payload, MetricsHook, Payload};
