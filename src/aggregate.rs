//! Result aggregation and consensus measurement.
//!
//! This module combines the per-backend results of one ensemble call into a
//! single answer: a weighted category vote, a weighted-average confidence,
//! and consensus metrics. All arithmetic is deterministic so aggregation can
//! be tested without live backends.

use crate::models::{AnalysisResult, IndividualModelResult, RegimeCategory};
use tracing::debug;

/// Aggregated answer plus consensus metrics for one ensemble call.
#[derive(Debug, Clone)]
pub struct AggregateOutcome {
    /// The combined result.
    pub result: AnalysisResult,
    /// True iff every successful backend reported the same category.
    pub consensus: bool,
    /// Winning category's share of total successful weight.
    pub consensus_level: f64,
}

impl AggregateOutcome {
    fn uncertain(reasoning: &str) -> Self {
        Self {
            result: AnalysisResult::uncertain(reasoning),
            consensus: false,
            consensus_level: 0.0,
        }
    }
}

/// Aggregate REGIME results by weighted category vote.
///
/// The winning category holds the largest accumulated weight; ties break by
/// first-seen order among successful results. Confidence is the weighted
/// average over successful results only. Callers filter out the zero-success
/// case before aggregation, but an empty input still degrades to the
/// canonical uncertain answer.
pub fn aggregate_regime(results: &[IndividualModelResult]) -> AggregateOutcome {
    let successful: Vec<&IndividualModelResult> =
        results.iter().filter(|r| r.is_success()).collect();

    if successful.is_empty() {
        return AggregateOutcome::uncertain("no successful model results");
    }

    let votes = weighted_vote(&successful);
    let (winner, winning_weight) = votes[0];
    let total_weight: f64 = votes.iter().map(|(_, w)| w).sum();

    let confidence = if total_weight > 0.0 {
        successful
            .iter()
            .filter_map(|r| r.result.as_ref().map(|res| res.confidence * r.weight))
            .sum::<f64>()
            / total_weight
    } else {
        0.0
    };

    let consensus = votes.len() == 1;
    let consensus_level = if total_weight > 0.0 {
        winning_weight / total_weight
    } else {
        0.0
    };

    debug!(
        category = %winner,
        confidence,
        consensus,
        consensus_level,
        models = successful.len(),
        "Aggregated regime vote"
    );

    AggregateOutcome {
        result: AnalysisResult {
            category: winner,
            confidence,
            reasoning: combined_reasoning(&successful),
            supporting_factors: combined_factors(&successful),
        },
        consensus,
        consensus_level,
    }
}

/// Pass through the first successful result unchanged.
///
/// EXPLANATION and PARAMETERS analyses are not yet vote-aggregated; the
/// first successful backend answers for the ensemble, while consensus is
/// still measured across all successful results so callers can observe
/// disagreement the same way as for REGIME.
pub fn first_success_passthrough(results: &[IndividualModelResult]) -> AggregateOutcome {
    let successful: Vec<&IndividualModelResult> =
        results.iter().filter(|r| r.is_success()).collect();

    let Some(first) = successful.first().and_then(|r| r.result.clone()) else {
        return AggregateOutcome::uncertain("no successful model results");
    };

    let votes = weighted_vote(&successful);
    let total_weight: f64 = votes.iter().map(|(_, w)| w).sum();
    let consensus_level = if total_weight > 0.0 {
        votes[0].1 / total_weight
    } else {
        0.0
    };

    AggregateOutcome {
        result: first,
        consensus: votes.len() == 1,
        consensus_level,
    }
}

/// Accumulate weight per category, preserving first-seen order.
///
/// Returns buckets sorted by weight descending; equal weights keep their
/// first-seen relative order, which is what makes the tie-break
/// deterministic. Never called with an empty slice.
fn weighted_vote(successful: &[&IndividualModelResult]) -> Vec<(RegimeCategory, f64)> {
    let mut buckets: Vec<(RegimeCategory, f64)> = Vec::new();

    for r in successful {
        if let Some(result) = &r.result {
            match buckets.iter_mut().find(|(c, _)| *c == result.category) {
                Some((_, weight)) => *weight += r.weight,
                None => buckets.push((result.category, r.weight)),
            }
        }
    }

    // Stable sort keeps first-seen order among equal weights.
    buckets.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    buckets
}

/// Concatenate each contributing model's reasoning, prefixed by its name.
fn combined_reasoning(successful: &[&IndividualModelResult]) -> String {
    successful
        .iter()
        .filter_map(|r| {
            r.result
                .as_ref()
                .map(|res| format!("{}: {}", r.backend_name, res.reasoning))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Deduplicated union of supporting factors, in first-seen order.
fn combined_factors(successful: &[&IndividualModelResult]) -> Vec<String> {
    let mut factors: Vec<String> = Vec::new();

    for r in successful {
        if let Some(result) = &r.result {
            for factor in &result.supporting_factors {
                if !factors.contains(factor) {
                    factors.push(factor.clone());
                }
            }
        }
    }

    factors
}
