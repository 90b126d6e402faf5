//! Injectable event hook.
//!
//! # Responsibilities
//! - Carry a single optional `(event, payload)` callback into the breaker and client
//! - Default to a no-op when nothing is injected
//! - Contain hook panics so they never reach the caller

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::{Map, Value};

/// Event payload: a flat JSON object.
pub type Payload = Map<String, Value>;

type HookFn = dyn Fn(&str, &Payload) + Send + Sync;

/// Observability hook shared by breakers and clients.
#[derive(Clone, Default)]
pub struct MetricsHook {
    inner: Option<Arc<HookFn>>,
}

impl MetricsHook {
    /// Wrap a callback.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str, &Payload) + Send + Sync + 'static,
    {
        Self {
            inner: Some(Arc::new(f)),
        }
    }

    /// A hook that drops every event.
    pub fn noop() -> Self {
        Self { inner: None }
    }

    /// Returns true if a callback is installed.
    pub fn is_installed(&self) -> bool {
        self.inner.is_some()
    }

    /// Deliver an event. A panicking callback is logged and swallowed.
    pub fn emit(&self, event: &str, payload: Payload) {
        let Some(hook) = &self.inner else {
            return;
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| hook(event, &payload)));
        if result.is_err() {
            tracing::debug!(event = %event, "Metrics hook failed");
        }
    }
}

impl fmt::Debug for MetricsHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsHook")
            .field("installed", &self.is_installed())
            .finish()
    }
}

/// Build a [`Payload`] from a `serde_json::json!` object literal.
///
/// Non-object values produce an empty payload.
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
