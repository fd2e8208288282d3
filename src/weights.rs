//! Allocation weight resolution.
//!
//! Turns an allocation (backend id + percentage pairs) into a normalized
//! weight map used by dispatch and aggregation.

use crate::models::Allocation;
use std::collections::HashMap;
use tracing::warn;

/// Normalized weights keyed by backend id, each in (0, 1].
pub type WeightMap = HashMap<String, f64>;

/// Tolerance when checking that weights sum to 1.0.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Resolve an allocation into a normalized weight map (`percentage / 100`).
///
/// The allocation store owns validity (integer percentages summing to 100);
/// a deviating sum is logged but not rejected, since a consistent relative
/// weighting still aggregates deterministically.
pub fn resolve_weights(allocation: &Allocation) -> WeightMap {
    let mut weights = WeightMap::with_capacity(allocation.len());

    for entry in &allocation.entries {
        weights.insert(entry.backend_id.clone(), f64::from(entry.percentage) / 100.0);
    }

    let total: f64 = weights.values().sum();
    if !allocation.is_empty() && (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        warn!(
            total,
            entries = allocation.len(),
            "Allocation weights do not sum to 1.0"
        );
    }

    weights
}
