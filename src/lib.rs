//! Consilium - weighted ensemble orchestration for market analysis.
//!
//! The engine consults multiple independently operated AI model backends in
//! parallel and combines their opinions into one decision, weighted by a
//! caller-supplied capital-allocation split. Any subset of backends may be
//! slow, erroring, or disagreeing; the caller still receives a single,
//! well-formed answer inside its deadline.
//!
//! Concrete backend clients, allocation storage, metadata lookup, and
//! alerting channels live behind the traits in [`providers`]; entry points
//! (HTTP, CLI, schedulers) are the host's concern.
//!
//! ```no_run
//! use consilium::{BackendRegistry, EngineConfig, EnsembleEngine};
//! use std::sync::Arc;
//!
//! # fn demo(
//! #     allocations: Arc<dyn consilium::AllocationProvider>,
//! #     metadata: Arc<dyn consilium::ModelMetadataProvider>,
//! #     registry: BackendRegistry,
//! # ) {
//! let engine = EnsembleEngine::new(
//!     EngineConfig::default(),
//!     allocations,
//!     metadata,
//!     Arc::new(registry),
//! );
//! # }
//! ```

pub mod aggregate;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod logging;
pub mod models;
pub mod providers;
pub mod weights;

pub use aggregate::AggregateOutcome;
pub use config::{EngineConfig, MAX_TIMEOUT_MS};
pub use engine::EnsembleEngine;
pub use error::EngineError;
pub use fallback::FallbackReason;
pub use models::{
    Allocation, AllocationEntry, AnalysisResult, AnalysisType, EnsembleRequest, EnsembleResponse,
    IndividualModelResult, MarketData, ModelStatus, Ohlc, RegimeCategory,
};
pub use providers::{
    AlertSink, AllocationProvider, AnalysisBackend, BackendRegistry, LogAlertSink,
    ModelMetadataProvider,
};
pub use weights::{resolve_weights, WeightMap};
