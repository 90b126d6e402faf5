//! Guarded AI inference.
//!
//! # Data Flow
//! ```text
//! InferenceRequest
//!     → guarded.rs (effective deadline)
//!     → resilience::CircuitBreaker (admit or serve `[unavailable]`)
//!     → InferenceBackend::infer
//! ```

pub mod guarded;
pub mod types;

pub use guarded::GuardedInference;
pub use types::{
    InferenceBackend, InferenceError, InferenceRequest, InferenceResult, FALLBACK_TEXT,
};
