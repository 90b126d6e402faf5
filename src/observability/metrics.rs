//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Translate resilience events into `metrics` counters and gauges
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `resilience_events_total` (counter): every hook event, labelled by `event`
//! - `resilience_circuit_state` (gauge): 0=closed, 1=open, 2=half-open, per `breaker`
//! - `shopify_retries_total` (counter): retry sleeps, labelled by `reason`
//! - `shopify_api_usage_ratio` (gauge): last observed call-limit utilization
//!
//! # Design Decisions
//! - Metric updates are atomic increments through the global recorder
//! - Without an installed recorder every call is a no-op

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value;

use crate::observability::hook::{MetricsHook, Payload};
use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

/// A hook that records every event through the `metrics` facade.
pub fn prometheus_hook() -> MetricsHook {
    MetricsHook::new(record_event)
}

/// Record one hook event.
pub fn record_event(event: &str, payload: &Payload) {
    counter!("resilience_events_total", "event" => event.to_string()).increment(1);

    match event {
        "circuit_open" => record_circuit_state(breaker_label(payload), CircuitState::Open),
        "circuit_half_open" => record_circuit_state(breaker_label(payload), CircuitState::HalfOpen),
        "circuit_reset" => record_circuit_state(breaker_label(payload), CircuitState::Closed),
        "shopify_retry" => {
            counter!("shopify_retries_total", "reason" => "backoff").increment(1);
        }
        "shopify_retry_after" => {
            counter!("shopify_retries_total", "reason" => "retry_after").increment(1);
        }
        "shopify_api_usage" => {
            if let Some(pct) = payload.get("pct").and_then(Value::as_f64) {
                gauge!("shopify_api_usage_ratio").set(pct);
            }
        }
        _ => {}
    }
}

/// Record the numeric state of a breaker.
pub fn record_circuit_state(breaker: String, state: CircuitState) {
    gauge!("resilience_circuit_state", "breaker" => breaker).set(state as u8 as f64);
}

fn breaker_label(payload: &Payload) -> String {
    payload
        .get("breaker")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}
