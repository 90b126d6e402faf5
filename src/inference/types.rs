//! Inference request/result types.

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resilience::Fallback;

/// Text served when the inference backend is unavailable.
pub const FALLBACK_TEXT: &str = "[unavailable]";

fn default_max_tokens() -> u32 {
    128
}

/// Prompt handed to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub prompt: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl InferenceRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: default_max_tokens(),
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Backend answer, or the degraded placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub text: String,
    pub confidence: f64,
    pub model: Option<String>,
}

impl InferenceResult {
    /// True for the placeholder served while the circuit is open.
    pub fn is_degraded(&self) -> bool {
        self.text == FALLBACK_TEXT && self.confidence == 0.0
    }
}

impl Fallback for InferenceResult {
    fn fallback(label: Option<&str>) -> Self {
        Self {
            text: FALLBACK_TEXT.to_string(),
            confidence: 0.0,
            model: label.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("inference backend unavailable: {0}")]
    Unavailable(String),

    #[error("inference failed: {0}")]
    Failed(String),
}

/// A model server. `timeout` is the deadline the breaker enforces, passed along
/// so the backend can bound its own I/O.
pub trait InferenceBackend: Send + Sync {
    fn model_name(&self) -> Option<&str>;

    fn infer<'a>(
        &'a self,
        request: &'a InferenceRequest,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<InferenceResult, InferenceError>>;
}
