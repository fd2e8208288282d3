//! Ensemble request coordination.
//!
//! `EnsembleEngine` is the engine's entry point: it resolves the strategy
//! allocation, fans the request out to every allocated backend, and turns
//! the settled results into one response via aggregation or fallback.
//! Expected failure modes (no allocation, zero successes) degrade to
//! fallback responses; the only error surfaced to callers is a failing
//! allocation store.

use crate::aggregate::{aggregate_regime, first_success_passthrough};
use crate::config::EngineConfig;
use crate::dispatch::ParallelDispatcher;
use crate::error::EngineError;
use crate::fallback::{FallbackPolicy, FallbackReason};
use crate::models::{AnalysisType, EnsembleRequest, EnsembleResponse};
use crate::providers::{
    AlertSink, AllocationProvider, BackendRegistry, LogAlertSink, ModelMetadataProvider,
};
use crate::weights::resolve_weights;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Coordinates ensemble analysis calls end to end.
///
/// Holds no per-request state; it is safe to run many `analyze` calls
/// concurrently on one engine.
pub struct EnsembleEngine {
    config: EngineConfig,
    allocations: Arc<dyn AllocationProvider>,
    dispatcher: ParallelDispatcher,
    fallback: FallbackPolicy,
}

impl EnsembleEngine {
    /// Create an engine with the default logging alert sink.
    pub fn new(
        config: EngineConfig,
        allocations: Arc<dyn AllocationProvider>,
        metadata: Arc<dyn ModelMetadataProvider>,
        backends: Arc<BackendRegistry>,
    ) -> Self {
        Self::with_alert_sink(config, allocations, metadata, backends, Arc::new(LogAlertSink))
    }

    /// Create an engine with an explicit alert sink.
    pub fn with_alert_sink(
        config: EngineConfig,
        allocations: Arc<dyn AllocationProvider>,
        metadata: Arc<dyn ModelMetadataProvider>,
        backends: Arc<BackendRegistry>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let fallback = FallbackPolicy::new(alerts, config.alert_on_total_failure);
        Self {
            config,
            allocations,
            dispatcher: ParallelDispatcher::new(backends, metadata),
            fallback,
        }
    }

    /// Run one ensemble analysis call.
    ///
    /// Always returns a complete `EnsembleResponse` for expected failure
    /// modes; partial or total backend failure is visible only through the
    /// individual result statuses and the consensus fields. `Err` means the
    /// allocation store itself failed.
    pub async fn analyze(&self, request: EnsembleRequest) -> Result<EnsembleResponse, EngineError> {
        let started = Instant::now();

        info!(
            tenant_id = %request.tenant_id,
            strategy_id = %request.strategy_id,
            analysis_type = %request.analysis_type,
            symbol = %request.market_data.symbol,
            "Starting ensemble analysis"
        );

        let allocation = self
            .allocations
            .get_allocation(&request.tenant_id, &request.strategy_id)
            .await
            .map_err(|source| EngineError::AllocationLookup {
                tenant_id: request.tenant_id.clone(),
                strategy_id: request.strategy_id.clone(),
                source,
            })?;

        let Some(allocation) = allocation.filter(|a| !a.is_empty()) else {
            let response = self
                .fallback
                .fallback(&request, vec![], FallbackReason::NoAllocation)
                .await;
            return Ok(stamp(response, started));
        };

        let weights = resolve_weights(&allocation);
        let timeout = self.config.effective_timeout(request.timeout_ms);

        let request = Arc::new(request);
        let results = self
            .dispatcher
            .dispatch(&allocation, &weights, Arc::clone(&request), timeout)
            .await;

        let response = if results.iter().any(|r| r.is_success()) {
            // Only REGIME gets the weighted vote; other types pass through
            // the first successful result for now.
            let outcome = match request.analysis_type {
                AnalysisType::Regime => aggregate_regime(&results),
                AnalysisType::Explanation | AnalysisType::Parameters => {
                    first_success_passthrough(&results)
                }
            };

            EnsembleResponse {
                aggregated_result: outcome.result,
                individual_results: results,
                consensus: outcome.consensus,
                consensus_level: outcome.consensus_level,
                processing_time_ms: 0,
                timestamp: Utc::now(),
            }
        } else {
            self.fallback
                .fallback(&request, results, FallbackReason::AllBackendsFailed)
                .await
        };

        let response = stamp(response, started);

        info!(
            tenant_id = %request.tenant_id,
            strategy_id = %request.strategy_id,
            category = %response.aggregated_result.category,
            consensus = response.consensus,
            consensus_level = response.consensus_level,
            processing_time_ms = response.processing_time_ms,
            "Ensemble analysis complete"
        );

        Ok(response)
    }
}

/// Stamp final timing metadata on a response.
fn stamp(mut response: EnsembleResponse, started: Instant) -> EnsembleResponse {
    response.processing_time_ms = started.elapsed().as_millis() as u64;
    response.timestamp = Utc::now();
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Allocation, AllocationEntry, AnalysisResult, MarketData, ModelStatus, Ohlc, RegimeCategory,
    };
    use crate::providers::AnalysisBackend;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct StaticAllocations(Option<Allocation>);

    #[async_trait]
    impl AllocationProvider for StaticAllocations {
        async fn get_allocation(
            &self,
            _tenant_id: &str,
            _strategy_id: &str,
        ) -> Result<Option<Allocation>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenAllocations;

    #[async_trait]
    impl AllocationProvider for BrokenAllocations {
        async fn get_allocation(
            &self,
            _tenant_id: &str,
            _strategy_id: &str,
        ) -> Result<Option<Allocation>> {
            Err(anyhow!("allocation store unreachable"))
        }
    }

    struct IdMetadata;

    #[async_trait]
    impl ModelMetadataProvider for IdMetadata {
        async fn display_name(&self, _tenant_id: &str, backend_id: &str) -> Result<String> {
            Ok(backend_id.to_string())
        }
    }

    struct FixedBackend {
        category: RegimeCategory,
        confidence: f64,
        delay: Duration,
    }

    #[async_trait]
    impl AnalysisBackend for FixedBackend {
        async fn classify_regime(&self, _request: &EnsembleRequest) -> Result<AnalysisResult> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(AnalysisResult {
                category: self.category,
                confidence: self.confidence,
                reasoning: "fixed".to_string(),
                supporting_factors: vec![],
            })
        }
    }

    #[derive(Default)]
    struct CountingSink {
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl AlertSink for CountingSink {
        async fn notify_total_failure(
            &self,
            _tenant_id: &str,
            _strategy_id: &str,
            errors: &[String],
        ) {
            self.calls.lock().unwrap().push(errors.to_vec());
        }
    }

    fn request(analysis_type: AnalysisType, timeout_ms: Option<u64>) -> EnsembleRequest {
        EnsembleRequest {
            tenant_id: "t1".to_string(),
            strategy_id: "s1".to_string(),
            analysis_type,
            market_data: MarketData {
                symbol: "BTC-USD".to_string(),
                ohlc: vec![Ohlc {
                    open: 100.0,
                    high: 110.0,
                    low: 95.0,
                    close: 105.0,
                }],
                volume: vec![1200.0],
                timestamp: Utc::now(),
            },
            timeout_ms,
            additional_context: None,
        }
    }

    fn engine_with(
        allocation: Option<Allocation>,
        registry: BackendRegistry,
        sink: Arc<CountingSink>,
    ) -> EnsembleEngine {
        EnsembleEngine::with_alert_sink(
            EngineConfig::default(),
            Arc::new(StaticAllocations(allocation)),
            Arc::new(IdMetadata),
            Arc::new(registry),
            sink,
        )
    }

    #[tokio::test]
    async fn test_weighted_disagreement_end_to_end() {
        let mut registry = BackendRegistry::new();
        registry.register(
            "m1",
            Arc::new(FixedBackend {
                category: RegimeCategory::TrendingUp,
                confidence: 0.8,
                delay: Duration::ZERO,
            }),
        );
        registry.register(
            "m2",
            Arc::new(FixedBackend {
                category: RegimeCategory::TrendingDown,
                confidence: 0.6,
                delay: Duration::ZERO,
            }),
        );

        let allocation = Allocation::new(vec![
            AllocationEntry::new("m1", 60, 1),
            AllocationEntry::new("m2", 40, 2),
        ]);
        let sink = Arc::new(CountingSink::default());
        let engine = engine_with(Some(allocation), registry, sink.clone());

        let response = engine
            .analyze(request(AnalysisType::Regime, Some(2000)))
            .await
            .unwrap();

        assert_eq!(response.individual_results.len(), 2);
        assert_eq!(response.individual_results[0].backend_id, "m1");
        assert_eq!(response.individual_results[1].backend_id, "m2");
        assert_eq!(
            response.aggregated_result.category,
            RegimeCategory::TrendingUp
        );
        assert!((response.aggregated_result.confidence - 0.72).abs() < 1e-9);
        assert!(!response.consensus);
        assert!((response.consensus_level - 0.6).abs() < 1e-9);
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_all_backends_timeout_falls_back_and_alerts_once() {
        let mut registry = BackendRegistry::new();
        for id in ["m1", "m2"] {
            registry.register(
                id,
                Arc::new(FixedBackend {
                    category: RegimeCategory::Ranging,
                    confidence: 0.9,
                    delay: Duration::from_millis(150),
                }),
            );
        }

        let allocation = Allocation::new(vec![
            AllocationEntry::new("m1", 50, 1),
            AllocationEntry::new("m2", 50, 2),
        ]);
        let sink = Arc::new(CountingSink::default());
        let engine = engine_with(Some(allocation), registry, sink.clone());

        let response = engine
            .analyze(request(AnalysisType::Regime, Some(10)))
            .await
            .unwrap();

        assert_eq!(response.individual_results.len(), 2);
        for r in &response.individual_results {
            assert_eq!(r.status, ModelStatus::Timeout);
        }
        assert_eq!(
            response.aggregated_result.category,
            RegimeCategory::Uncertain
        );
        assert_eq!(response.aggregated_result.confidence, 0.0);
        assert!(!response.consensus);
        assert_eq!(response.consensus_level, 0.0);

        let calls = sink.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 2);
    }

    #[tokio::test]
    async fn test_no_allocation_skips_backends() {
        let sink = Arc::new(CountingSink::default());
        let engine = engine_with(None, BackendRegistry::new(), sink.clone());

        let response = engine
            .analyze(request(AnalysisType::Regime, None))
            .await
            .unwrap();

        assert!(response.individual_results.is_empty());
        assert_eq!(
            response.aggregated_result.category,
            RegimeCategory::Uncertain
        );
        assert_eq!(
            response.aggregated_result.reasoning,
            "no allocation found for strategy"
        );
        assert!(!response.consensus);
        // Configuration gap, not a backend failure: no alert.
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_allocation_treated_as_missing() {
        let sink = Arc::new(CountingSink::default());
        let engine = engine_with(
            Some(Allocation::default()),
            BackendRegistry::new(),
            sink.clone(),
        );

        let response = engine
            .analyze(request(AnalysisType::Regime, None))
            .await
            .unwrap();

        assert!(response.individual_results.is_empty());
        assert!(!response.consensus);
    }

    #[tokio::test]
    async fn test_partial_failure_still_aggregates() {
        let mut registry = BackendRegistry::new();
        registry.register(
            "fast",
            Arc::new(FixedBackend {
                category: RegimeCategory::HighVolatility,
                confidence: 0.7,
                delay: Duration::ZERO,
            }),
        );
        registry.register(
            "slow",
            Arc::new(FixedBackend {
                category: RegimeCategory::Ranging,
                confidence: 0.9,
                delay: Duration::from_millis(500),
            }),
        );

        let allocation = Allocation::new(vec![
            AllocationEntry::new("fast", 50, 1),
            AllocationEntry::new("slow", 50, 2),
        ]);
        let sink = Arc::new(CountingSink::default());
        let engine = engine_with(Some(allocation), registry, sink.clone());

        let response = engine
            .analyze(request(AnalysisType::Regime, Some(50)))
            .await
            .unwrap();

        assert_eq!(response.individual_results.len(), 2);
        assert_eq!(response.individual_results[0].status, ModelStatus::Success);
        assert_eq!(response.individual_results[1].status, ModelStatus::Timeout);
        assert_eq!(
            response.aggregated_result.category,
            RegimeCategory::HighVolatility
        );
        // Single successful backend: vacuous consensus at full level.
        assert!(response.consensus);
        assert!((response.consensus_level - 1.0).abs() < 1e-9);
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_explanation_passes_through_first_success() {
        let mut registry = BackendRegistry::new();
        registry.register(
            "m1",
            Arc::new(FixedBackend {
                category: RegimeCategory::TrendingDown,
                confidence: 0.45,
                delay: Duration::ZERO,
            }),
        );
        registry.register(
            "m2",
            Arc::new(FixedBackend {
                category: RegimeCategory::TrendingUp,
                confidence: 0.95,
                delay: Duration::ZERO,
            }),
        );

        let allocation = Allocation::new(vec![
            AllocationEntry::new("m1", 50, 1),
            AllocationEntry::new("m2", 50, 2),
        ]);
        let sink = Arc::new(CountingSink::default());
        let engine = engine_with(Some(allocation), registry, sink);

        let response = engine
            .analyze(request(AnalysisType::Explanation, Some(2000)))
            .await
            .unwrap();

        // First allocated backend wins regardless of confidence.
        assert_eq!(
            response.aggregated_result.category,
            RegimeCategory::TrendingDown
        );
        assert!((response.aggregated_result.confidence - 0.45).abs() < 1e-9);
        assert!(!response.consensus);
    }

    #[tokio::test]
    async fn test_allocation_store_failure_is_fatal() {
        let engine = EnsembleEngine::new(
            EngineConfig::default(),
            Arc::new(BrokenAllocations),
            Arc::new(IdMetadata),
            Arc::new(BackendRegistry::new()),
        );

        let err = engine
            .analyze(request(AnalysisType::Regime, None))
            .await
            .unwrap_err();

        let EngineError::AllocationLookup {
            tenant_id,
            strategy_id,
            ..
        } = err;
        assert_eq!(tenant_id, "t1");
        assert_eq!(strategy_id, "s1");
    }

    #[tokio::test]
    async fn test_processing_time_is_stamped() {
        let mut registry = BackendRegistry::new();
        registry.register(
            "m1",
            Arc::new(FixedBackend {
                category: RegimeCategory::Ranging,
                confidence: 0.8,
                delay: Duration::from_millis(20),
            }),
        );

        let allocation = Allocation::new(vec![AllocationEntry::new("m1", 100, 1)]);
        let sink = Arc::new(CountingSink::default());
        let engine = engine_with(Some(allocation), registry, sink);

        let response = engine
            .analyze(request(AnalysisType::Regime, Some(1000)))
            .await
            .unwrap();

        assert!(response.processing_time_ms >= 20);
        assert!(response.processing_time_ms < 1000);
    }
}
