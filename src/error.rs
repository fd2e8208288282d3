//! Engine error types.
//!
//! Per-backend failures never surface here; they become `ModelStatus`
//! values on the individual results. The only fatal path is the
//! coordinator's own allocation lookup.

use thiserror::Error;

/// Fatal coordinator errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The allocation store itself failed (not "no allocation found",
    /// which degrades to a fallback response).
    #[error("allocation lookup failed for tenant '{tenant_id}', strategy '{strategy_id}'")]
    AllocationLookup {
        tenant_id: String,
        strategy_id: String,
        #[source]
        source: anyhow::Error,
    },
}
