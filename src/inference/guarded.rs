//! Inference backend behind a circuit breaker.
//!
//! # Responsibilities
//! - Bound every backend call by the effective timeout
//! - Serve `[unavailable]` while the backend is considered down
//!
//! # Design Decisions
//! - The breaker label defaults to the backend's model name
//! - The same deadline is handed to the backend and enforced by the breaker

use std::sync::Arc;
use std::time::Duration;

use crate::config::BreakerConfig;
use crate::inference::types::{InferenceBackend, InferenceError, InferenceRequest, InferenceResult};
use crate::observability::hook::MetricsHook;
use crate::resilience::{BreakerError, CircuitBreaker};

/// Backend plus the breaker that guards it.
pub struct GuardedInference<B> {
    backend: B,
    breaker: Arc<CircuitBreaker>,
}

impl<B: InferenceBackend> GuardedInference<B> {
    pub fn new(backend: B, mut config: BreakerConfig, hook: MetricsHook) -> Self {
        if config.model_name.is_none() {
            config.model_name = backend.model_name().map(str::to_string);
        }
        let name = config
            .model_name
            .clone()
            .unwrap_or_else(|| "inference".to_string());
        let breaker = Arc::new(CircuitBreaker::new(name, config).with_hook(hook));
        Self { backend, breaker }
    }

    /// Guard `backend` with an existing (possibly shared) breaker.
    pub fn with_breaker(backend: B, breaker: Arc<CircuitBreaker>) -> Self {
        Self { backend, breaker }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run one inference. Returns the fallback while the circuit is open.
    pub async fn infer(
        &self,
        request: &InferenceRequest,
        timeout: Option<Duration>,
    ) -> Result<InferenceResult, BreakerError<InferenceError>> {
        let deadline = timeout.unwrap_or_else(|| self.breaker.config().call_timeout());
        self.breaker
            .execute(|| self.backend.infer(request, deadline), Some(deadline))
            .await
    }

    /// Convenience wrapper for a bare prompt.
    pub async fn infer_prompt(
        &self,
        prompt: &str,
    ) -> Result<InferenceResult, BreakerError<InferenceError>> {
        self.infer(&InferenceRequest::new(prompt), None).await
    }
}
