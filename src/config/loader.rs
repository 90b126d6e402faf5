//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ResilienceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, apply environment overrides, and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ResilienceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: ResilienceConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Default configuration with environment overrides, validated.
pub fn from_env() -> Result<ResilienceConfig, ConfigError> {
    let mut config = ResilienceConfig::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Overlay deployment environment variables onto `config`.
///
/// Recognized variables:
/// - `AI_CB_FAILURE_THRESHOLD`, `AI_CB_RESET_TIMEOUT`, `AI_INFERENCE_TIMEOUT`, `AI_MODEL_NAME`
/// - `SHOPIFY_SHOP_DOMAIN`, `SHOPIFY_ACCESS_TOKEN`
pub fn apply_env_overrides<F>(config: &mut ResilienceConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("AI_CB_FAILURE_THRESHOLD") {
        config.breaker.failure_threshold = parse_env("AI_CB_FAILURE_THRESHOLD", value)?;
    }
    if let Some(value) = lookup("AI_CB_RESET_TIMEOUT") {
        config.breaker.reset_timeout_secs = parse_env("AI_CB_RESET_TIMEOUT", value)?;
    }
    if let Some(value) = lookup("AI_INFERENCE_TIMEOUT") {
        config.breaker.call_timeout_secs = parse_env("AI_INFERENCE_TIMEOUT", value)?;
    }
    if let Some(value) = lookup("AI_MODEL_NAME") {
        config.breaker.model_name = Some(value).filter(|v| !v.is_empty());
    }
    if let Some(value) = lookup("SHOPIFY_SHOP_DOMAIN") {
        config.shop.shop_domain = value;
    }
    if let Some(value) = lookup("SHOPIFY_ACCESS_TOKEN") {
        config.shop.access_token = value;
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}
