//! Parallel backend dispatch.
//!
//! Fans out one task per allocated backend, races every task against one
//! shared absolute deadline, and fans back in preserving allocation order.
//! Every allocation entry yields exactly one result regardless of how the
//! backend behaves.

use crate::models::{Allocation, AllocationEntry, EnsembleRequest, IndividualModelResult};
use crate::providers::{AnalysisBackend, BackendRegistry, ModelMetadataProvider};
use crate::weights::WeightMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// Dispatches ensemble requests to all allocated backends concurrently.
pub struct ParallelDispatcher {
    backends: Arc<BackendRegistry>,
    metadata: Arc<dyn ModelMetadataProvider>,
}

impl ParallelDispatcher {
    pub fn new(backends: Arc<BackendRegistry>, metadata: Arc<dyn ModelMetadataProvider>) -> Self {
        Self { backends, metadata }
    }

    /// Invoke every allocated backend concurrently under a shared deadline.
    ///
    /// Guarantees one `IndividualModelResult` per allocation entry, in
    /// allocation order, and returns no later than `timeout` plus scheduling
    /// overhead. The deadline is absolute and measured from dispatch start;
    /// it is not restarted per backend.
    pub async fn dispatch(
        &self,
        allocation: &Allocation,
        weights: &WeightMap,
        request: Arc<EnsembleRequest>,
        timeout: Duration,
    ) -> Vec<IndividualModelResult> {
        let deadline = Instant::now() + timeout;
        let timeout_ms = timeout.as_millis() as u64;

        debug!(
            backends = allocation.len(),
            timeout_ms, "Dispatching ensemble request"
        );

        let mut handles = Vec::with_capacity(allocation.len());
        for entry in &allocation.entries {
            let backend = self.backends.get(&entry.backend_id);
            let metadata = Arc::clone(&self.metadata);
            let request = Arc::clone(&request);
            let weight = weights.get(&entry.backend_id).copied().unwrap_or(0.0);
            let entry = entry.clone();

            handles.push(tokio::spawn(run_backend(
                entry, backend, metadata, request, weight, deadline, timeout_ms,
            )));
        }

        // join_all preserves spawn order, so results line up with the
        // allocation regardless of which backend settles first.
        let settled = join_all(handles).await;

        settled
            .into_iter()
            .zip(&allocation.entries)
            .map(|(joined, entry)| match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!(backend_id = %entry.backend_id, error = %e, "Dispatch task aborted");
                    IndividualModelResult::error(
                        &entry.backend_id,
                        &entry.backend_id,
                        format!("dispatch task aborted: {}", e),
                        weights.get(&entry.backend_id).copied().unwrap_or(0.0),
                    )
                }
            })
            .collect()
    }
}

/// Run a single backend invocation against the shared deadline.
async fn run_backend(
    entry: AllocationEntry,
    backend: Option<Arc<dyn AnalysisBackend>>,
    metadata: Arc<dyn ModelMetadataProvider>,
    request: Arc<EnsembleRequest>,
    weight: f64,
    deadline: Instant,
    timeout_ms: u64,
) -> IndividualModelResult {
    // Best-effort name lookup, also bounded by the deadline so a hung
    // metadata store cannot stall the fan-in barrier.
    let name = match timeout_at(
        deadline,
        metadata.display_name(&request.tenant_id, &entry.backend_id),
    )
    .await
    {
        Ok(Ok(name)) => name,
        Ok(Err(e)) => {
            debug!(
                backend_id = %entry.backend_id,
                error = %e,
                "Display name lookup failed, using backend id"
            );
            entry.backend_id.clone()
        }
        Err(_) => entry.backend_id.clone(),
    };

    let Some(backend) = backend else {
        warn!(backend_id = %entry.backend_id, "Allocation names an unregistered backend");
        return IndividualModelResult::error(
            &entry.backend_id,
            name,
            format!("no backend registered for id '{}'", entry.backend_id),
            weight,
        );
    };

    // The race: completion, failure, or deadline, whichever comes first.
    // When the deadline wins, timeout_at drops the in-flight future, which
    // cancels the underlying call at its next await point.
    match timeout_at(deadline, backend.classify_regime(&request)).await {
        Ok(Ok(result)) => {
            debug!(backend_id = %entry.backend_id, category = %result.category, "Backend answered");
            IndividualModelResult::success(&entry.backend_id, name, result, weight)
        }
        Ok(Err(e)) => {
            warn!(backend_id = %entry.backend_id, error = %e, "Backend call failed");
            IndividualModelResult::error(&entry.backend_id, name, e.to_string(), weight)
        }
        Err(_) => {
            warn!(backend_id = %entry.backend_id, timeout_ms, "Backend timed out");
            IndividualModelResult::timeout(&entry.backend_id, name, timeout_ms, weight)
        }
    }
}
