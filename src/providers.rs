//! Capability traits consumed by the engine.
//!
//! The engine never talks to a concrete AI provider, allocation store, or
//! alerting channel directly; everything external sits behind one of these
//! traits so implementations can be swapped (and stubbed in tests) without
//! touching core logic.

use crate::models::{Allocation, AnalysisResult, EnsembleRequest};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

/// Source of the tenant-configured backend split for a strategy.
#[async_trait]
pub trait AllocationProvider: Send + Sync {
    /// Current allocation for `(tenant_id, strategy_id)`, or `None` when the
    /// strategy has no configured split. An `Err` here is treated as a fatal
    /// coordinator fault, not a per-backend failure.
    async fn get_allocation(
        &self,
        tenant_id: &str,
        strategy_id: &str,
    ) -> Result<Option<Allocation>>;
}

/// Best-effort lookup of human-readable model names.
#[async_trait]
pub trait ModelMetadataProvider: Send + Sync {
    /// Display name for a backend. Failure falls back to the raw backend id
    /// and must never fail a dispatch task.
    async fn display_name(&self, tenant_id: &str, backend_id: &str) -> Result<String>;
}

/// A single external AI model provider.
///
/// Calls may fail or hang arbitrarily; the dispatcher races every call
/// against the shared deadline and drops it when the deadline fires.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Classify the market regime for the given request.
    async fn classify_regime(&self, request: &EnsembleRequest) -> Result<AnalysisResult>;
}

/// Notification channel for total ensemble failure.
///
/// Infallible by signature: implementations own their failure handling, so
/// a broken alert path can never change an already-computed response.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify_total_failure(&self, tenant_id: &str, strategy_id: &str, errors: &[String]);
}

/// Default alert sink: logs at ERROR level and nothing else.
#[derive(Debug, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn notify_total_failure(&self, tenant_id: &str, strategy_id: &str, errors: &[String]) {
        error!(
            tenant_id,
            strategy_id,
            failures = errors.len(),
            "All ensemble backends failed: {}",
            errors.join("; ")
        );
    }
}

/// Registry mapping backend ids to their clients.
///
/// Allocation entries name backends by id; the dispatcher resolves each id
/// here. An unregistered id yields an ERROR result for that entry rather
/// than failing the call.
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn AnalysisBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend client under an id, replacing any previous one.
    pub fn register(&mut self, backend_id: impl Into<String>, backend: Arc<dyn AnalysisBackend>) {
        self.backends.insert(backend_id.into(), backend);
    }

    /// Look up a backend client by id.
    pub fn get(&self, backend_id: &str) -> Option<Arc<dyn AnalysisBackend>> {
        self.backends.get(backend_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
