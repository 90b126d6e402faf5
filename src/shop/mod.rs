//! Shop Admin API access.
//!
//! # Data Flow
//! ```text
//! ShopRequest
//!     → client.rs (resolve URL, attach token and idempotency key)
//!     → transport.rs (one HTTP exchange)
//!     → rate_limit.rs (record call-limit usage)
//!     → resilience::retries (classify, wait, retry or return)
//! ```
//!
//! # Design Decisions
//! - The transport is a trait so tests and alternative clients can plug in
//! - Wrap a `RetryingClient` call in a `CircuitBreaker` when the shop
//!   should be short-circuited after repeated exhaustion

pub mod client;
pub mod rate_limit;
pub mod transport;
pub mod types;

pub use client::RetryingClient;
pub use rate_limit::CallLimit;
pub use transport::{ReqwestTransport, Transport};
pub use types::{
    IdempotencyKey, ShopError, ShopRequest, ShopResult, TransportError, UpstreamRequest,
    UpstreamResponse,
};
