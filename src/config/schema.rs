//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the resilience layer.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Circuit breaker defaults for wrapped inference calls.
    pub breaker: BreakerConfig,

    /// Shopify Admin API client settings.
    pub shop: ShopClientConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Seconds an open circuit waits before a half-open trial.
    pub reset_timeout_secs: f64,

    /// Default per-call deadline in seconds.
    pub call_timeout_secs: f64,

    /// Admit only one in-flight trial while half-open.
    pub single_trial: bool,

    /// Model name reported in fallback results.
    pub model_name: Option<String>,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_secs: 30.0,
            call_timeout_secs: 5.0,
            single_trial: false,
            model_name: None,
        }
    }
}

impl BreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.reset_timeout_secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.call_timeout_secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// Shopify Admin API client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShopClientConfig {
    /// Shop domain (e.g., "example.myshopify.com").
    pub shop_domain: String,

    /// Admin API access token.
    pub access_token: String,

    /// Total attempts per request, including the first.
    pub max_retries: u32,

    /// Base of exponential backoff in seconds.
    pub backoff_base_secs: f64,

    /// Call-limit utilization (0-1) that triggers a high-usage warning.
    pub rate_warn_threshold: f64,

    /// Per-attempt request timeout in seconds.
    pub request_timeout_secs: f64,
}

impl Default for ShopClientConfig {
    fn default() -> Self {
        Self {
            shop_domain: String::new(),
            access_token: String::new(),
            max_retries: 5,
            backoff_base_secs: 0.5,
            rate_warn_threshold: 0.8,
            request_timeout_secs: 10.0,
        }
    }
}

impl ShopClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.request_timeout_secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
