//! Call-limit tracking from shop API response headers.
//!
//! The Admin API reports leaky-bucket consumption on every response as
//! `X-Shopify-Shop-Api-Call-Limit: <used>/<capacity>`. Observation is
//! best-effort: a missing or malformed header is ignored.

use reqwest::header::HeaderMap;
use serde_json::json;

use crate::observability::hook::{payload, MetricsHook};

/// Header carrying bucket usage.
pub const CALL_LIMIT_HEADER: &str = "x-shopify-shop-api-call-limit";

/// `(used, capacity)` pair parsed from one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallLimit {
    pub used: u64,
    pub capacity: u64,
}

impl CallLimit {
    /// Parse `"<used>/<capacity>"`.
    pub fn parse(value: &str) -> Option<Self> {
        let (used, capacity) = value.split_once('/')?;
        Some(Self {
            used: used.trim().parse().ok()?,
            capacity: capacity.trim().parse().ok()?,
        })
    }

    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(CALL_LIMIT_HEADER)?.to_str().ok()?;
        Self::parse(value)
    }

    /// `used / capacity`, or 0.0 for an empty bucket.
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.used as f64 / self.capacity as f64
    }
}

/// Record bucket usage from a response, warning at or above `warn_threshold`.
pub fn observe(headers: &HeaderMap, warn_threshold: f64, hook: &MetricsHook) -> Option<CallLimit> {
    let limit = CallLimit::from_headers(headers)?;
    let pct = limit.utilization();

    hook.emit(
        "shopify_api_usage",
        payload(json!({ "used": limit.used, "bucket": limit.capacity, "pct": pct })),
    );
    tracing::debug!(
        used = limit.used,
        bucket = limit.capacity,
        pct = pct * 100.0,
        "Shop API call limit"
    );

    if pct >= warn_threshold {
        tracing::warn!(
            used = limit.used,
            bucket = limit.capacity,
            "Shop API usage high: {:.0}%",
            pct * 100.0
        );
        hook.emit(
            "shopify_api_usage_high",
            payload(json!({ "used": limit.used, "bucket": limit.capacity, "pct": pct })),
        );
    }

    Some(limit)
}
