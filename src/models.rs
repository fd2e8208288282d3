//! Data models for the ensemble engine.
//!
//! This module contains all the core data structures used throughout
//! the engine for representing requests, per-backend results, and
//! aggregated responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Market regime categories a backend can classify into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegimeCategory {
    /// Sustained upward price movement.
    TrendingUp,
    /// Sustained downward price movement.
    TrendingDown,
    /// Sideways, range-bound market.
    Ranging,
    /// Elevated volatility without clear direction.
    HighVolatility,
    /// Compressed volatility, low activity.
    LowVolatility,
    /// No reliable classification available.
    Uncertain,
}

impl fmt::Display for RegimeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegimeCategory::TrendingUp => write!(f, "TRENDING_UP"),
            RegimeCategory::TrendingDown => write!(f, "TRENDING_DOWN"),
            RegimeCategory::Ranging => write!(f, "RANGING"),
            RegimeCategory::HighVolatility => write!(f, "HIGH_VOLATILITY"),
            RegimeCategory::LowVolatility => write!(f, "LOW_VOLATILITY"),
            RegimeCategory::Uncertain => write!(f, "UNCERTAIN"),
        }
    }
}

/// Kind of analysis requested from the ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisType {
    /// Market regime classification (weighted-vote aggregation).
    Regime,
    /// Natural-language explanation of market conditions.
    Explanation,
    /// Strategy parameter suggestions.
    Parameters,
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisType::Regime => write!(f, "REGIME"),
            AnalysisType::Explanation => write!(f, "EXPLANATION"),
            AnalysisType::Parameters => write!(f, "PARAMETERS"),
        }
    }
}

/// Outcome of a single backend invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelStatus {
    /// The backend returned a usable result.
    Success,
    /// The shared deadline elapsed before the backend answered.
    Timeout,
    /// The backend call failed.
    Error,
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelStatus::Success => write!(f, "SUCCESS"),
            ModelStatus::Timeout => write!(f, "TIMEOUT"),
            ModelStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// A single OHLC candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ohlc {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Market data snapshot handed to every backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketData {
    /// Instrument symbol (e.g., "BTC-USD").
    pub symbol: String,
    /// OHLC candle series, oldest first.
    pub ohlc: Vec<Ohlc>,
    /// Volume series aligned with the candles.
    pub volume: Vec<f64>,
    /// Timestamp of the most recent observation.
    pub timestamp: DateTime<Utc>,
}

/// One inbound analysis call. Immutable for the duration of the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleRequest {
    /// Tenant owning the strategy.
    pub tenant_id: String,
    /// Strategy whose allocation selects the backends.
    pub strategy_id: String,
    /// Which kind of analysis to run.
    pub analysis_type: AnalysisType,
    /// Market data snapshot.
    pub market_data: MarketData,
    /// Overall deadline in milliseconds. `None` uses the configured default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Free-form extra context forwarded to backends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<Value>,
}

/// Classification produced by a single backend (or by aggregation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Classified market regime.
    pub category: RegimeCategory,
    /// Confidence in the classification, 0.0 to 1.0.
    pub confidence: f64,
    /// Human-readable reasoning.
    pub reasoning: String,
    /// Supporting factors cited by the model.
    pub supporting_factors: Vec<String>,
}

impl AnalysisResult {
    /// Canonical "no reliable answer" result.
    pub fn uncertain(reasoning: impl Into<String>) -> Self {
        Self {
            category: RegimeCategory::Uncertain,
            confidence: 0.0,
            reasoning: reasoning.into(),
            supporting_factors: Vec::new(),
        }
    }
}

/// Outcome of one backend invocation within an ensemble call.
///
/// Exactly one instance exists per allocation entry, in allocation order.
/// `result` is `Some` iff `status == Success`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndividualModelResult {
    /// Backend identifier from the allocation.
    pub backend_id: String,
    /// Display name (falls back to the backend id).
    pub backend_name: String,
    /// The classification, present only on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    /// How the invocation ended.
    pub status: ModelStatus,
    /// Failure detail for TIMEOUT and ERROR outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Normalized allocation weight of this backend.
    pub weight: f64,
}

impl IndividualModelResult {
    /// Successful invocation.
    pub fn success(
        backend_id: impl Into<String>,
        backend_name: impl Into<String>,
        result: AnalysisResult,
        weight: f64,
    ) -> Self {
        Self {
            backend_id: backend_id.into(),
            backend_name: backend_name.into(),
            result: Some(result),
            status: ModelStatus::Success,
            error_message: None,
            weight,
        }
    }

    /// Failed invocation.
    pub fn error(
        backend_id: impl Into<String>,
        backend_name: impl Into<String>,
        message: impl Into<String>,
        weight: f64,
    ) -> Self {
        Self {
            backend_id: backend_id.into(),
            backend_name: backend_name.into(),
            result: None,
            status: ModelStatus::Error,
            error_message: Some(message.into()),
            weight,
        }
    }

    /// Invocation cut off by the shared deadline.
    pub fn timeout(
        backend_id: impl Into<String>,
        backend_name: impl Into<String>,
        timeout_ms: u64,
        weight: f64,
    ) -> Self {
        Self {
            backend_id: backend_id.into(),
            backend_name: backend_name.into(),
            result: None,
            status: ModelStatus::Timeout,
            error_message: Some(format!("timed out after {}ms", timeout_ms)),
            weight,
        }
    }

    /// Whether this entry contributes to aggregation.
    pub fn is_success(&self) -> bool {
        self.status == ModelStatus::Success
    }
}

/// The complete ensemble answer for one request. Never mutated after return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleResponse {
    /// Combined result. Always populated, even under total failure.
    pub aggregated_result: AnalysisResult,
    /// One entry per allocation entry, in allocation order.
    pub individual_results: Vec<IndividualModelResult>,
    /// True iff every successful backend agreed on the category.
    pub consensus: bool,
    /// Winning category's share of successful weight, 0.0 to 1.0.
    pub consensus_level: f64,
    /// Wall time spent processing the request.
    pub processing_time_ms: u64,
    /// Completion time.
    pub timestamp: DateTime<Utc>,
}

/// One backend's slice of a strategy allocation.
///
/// Owned by the external allocation store; read-only input here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationEntry {
    /// Backend identifier.
    pub backend_id: String,
    /// Capital percentage, 10 to 100; entries sum to 100.
    pub percentage: u32,
    /// Ranking within the allocation (lower is higher priority).
    pub priority: u32,
}

impl AllocationEntry {
    pub fn new(backend_id: impl Into<String>, percentage: u32, priority: u32) -> Self {
        Self {
            backend_id: backend_id.into(),
            percentage,
            priority,
        }
    }
}

/// The tenant-configured split of analysis weight across backends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Allocation {
    pub entries: Vec<AllocationEntry>,
}

impl Allocation {
    pub fn new(entries: Vec<AllocationEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
