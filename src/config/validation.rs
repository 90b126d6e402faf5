//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, ratios in (0, 1])
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ResilienceConfig → Result<(), Vec<ValidationError>>

use std::fmt;

use crate::config::schema::ResilienceConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

// NaN fails every comparison, so it is rejected by all three.
fn is_positive(value: f64) -> bool {
    value > 0.0
}

fn is_non_negative(value: f64) -> bool {
    value >= 0.0
}

fn is_ratio(value: f64) -> bool {
    value > 0.0 && value <= 1.0
}

/// Check a configuration and collect every violation.
pub fn validate_config(config: &ResilienceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let breaker = &config.breaker;
    let shop = &config.shop;

    if breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("breaker.failure_threshold", "must be at least 1"));
    }
    if !is_positive(breaker.reset_timeout_secs) {
        errors.push(ValidationError::new("breaker.reset_timeout_secs", "must be positive"));
    }
    if !is_positive(breaker.call_timeout_secs) {
        errors.push(ValidationError::new("breaker.call_timeout_secs", "must be positive"));
    }

    if shop.max_retries == 0 {
        errors.push(ValidationError::new("shop.max_retries", "must be at least 1"));
    }
    if !is_non_negative(shop.backoff_base_secs) {
        errors.push(ValidationError::new("shop.backoff_base_secs", "must not be negative"));
    }
    if !is_ratio(shop.rate_warn_threshold) {
        errors.push(ValidationError::new(
            "shop.rate_warn_threshold",
            format!("must be in (0, 1], got {}", shop.rate_warn_threshold),
        ));
    }
    if !is_positive(shop.request_timeout_secs) {
        errors.push(ValidationError::new("shop.request_timeout_secs", "must be positive"));
    }
    if !shop.access_token.is_empty() && shop.shop_domain.trim().is_empty() {
        errors.push(ValidationError::new(
            "shop.shop_domain",
            "required when an access token is configured",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
