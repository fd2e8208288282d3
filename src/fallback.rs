//! Total-failure fallback policy.
//!
//! When an ensemble call produces zero successful results, the caller still
//! receives a complete, well-formed response. This module builds that
//! canonical answer and fires the alert sink when the failure was real
//! (every backend erroring or timing out), not configurational (no
//! allocation for the strategy).

use crate::models::{AnalysisResult, EnsembleRequest, EnsembleResponse, IndividualModelResult};
use crate::providers::AlertSink;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Why the fallback path was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// No allocation exists for the strategy; no backend was invoked.
    NoAllocation,
    /// Every invoked backend failed or timed out.
    AllBackendsFailed,
}

impl FallbackReason {
    /// Reasoning text placed on the fallback result.
    pub fn message(&self) -> &'static str {
        match self {
            FallbackReason::NoAllocation => "no allocation found for strategy",
            FallbackReason::AllBackendsFailed => "all ensemble backends failed or timed out",
        }
    }
}

/// Builds fallback responses and routes total-failure alerts.
pub struct FallbackPolicy {
    alerts: Arc<dyn AlertSink>,
    alert_on_total_failure: bool,
}

impl FallbackPolicy {
    pub fn new(alerts: Arc<dyn AlertSink>, alert_on_total_failure: bool) -> Self {
        Self {
            alerts,
            alert_on_total_failure,
        }
    }

    /// Produce the canonical "uncertain" response for a failed call.
    ///
    /// Alerts at most once per call, only for genuine backend failures, and
    /// only when alerting is enabled. The alert cannot change the response:
    /// the sink is infallible by contract and the response is fully built
    /// before notification.
    pub async fn fallback(
        &self,
        request: &EnsembleRequest,
        results: Vec<IndividualModelResult>,
        reason: FallbackReason,
    ) -> EnsembleResponse {
        let response = EnsembleResponse {
            aggregated_result: AnalysisResult::uncertain(reason.message()),
            individual_results: results,
            consensus: false,
            consensus_level: 0.0,
            processing_time_ms: 0,
            timestamp: Utc::now(),
        };

        match reason {
            FallbackReason::NoAllocation => {
                info!(
                    tenant_id = %request.tenant_id,
                    strategy_id = %request.strategy_id,
                    "No allocation configured, returning fallback response"
                );
            }
            FallbackReason::AllBackendsFailed => {
                warn!(
                    tenant_id = %request.tenant_id,
                    strategy_id = %request.strategy_id,
                    backends = response.individual_results.len(),
                    "Total ensemble failure, returning fallback response"
                );

                if self.alert_on_total_failure {
                    let errors: Vec<String> = response
                        .individual_results
                        .iter()
                        .map(|r| {
                            format!(
                                "{}: {}",
                                r.backend_id,
                                r.error_message.as_deref().unwrap_or("unknown failure")
                            )
                        })
                        .collect();

                    self.alerts
                        .notify_total_failure(&request.tenant_id, &request.strategy_id, &errors)
                        .await;
                }
            }
        }

        response
    }
}
