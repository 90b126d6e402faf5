//! Per-target breaker registry.
//!
//! # Responsibilities
//! - Hand out one shared breaker per logical target name
//! - Report every breaker's state for status output

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::BreakerConfig;
use crate::observability::hook::MetricsHook;
use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitBreaker};

/// Lazily created breakers keyed by target name.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    defaults: BreakerConfig,
    hook: MetricsHook,
}

impl BreakerRegistry {
    pub fn new(defaults: BreakerConfig, hook: MetricsHook) -> Self {
        Self {
            breakers: DashMap::new(),
            defaults,
            hook,
        }
    }

    /// Breaker for `name`, created from the registry defaults on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.clone();
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(breaker = %name, "Creating circuit breaker");
                let breaker = CircuitBreaker::new(name, self.defaults.clone());
                Arc::new(breaker.with_hook(self.hook.clone()))
            })
            .clone()
    }

    /// Register a breaker with its own config. An existing entry is kept.
    pub fn insert_with(&self, name: &str, config: BreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(name, config).with_hook(self.hook.clone()))
            })
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| b.clone())
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Snapshots sorted by name.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}
