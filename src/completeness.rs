//! Input-sufficiency score.
//!
//! A fixed weighted sum of five signals. Each component is in [0, 1] and the
//! weights sum to 1.0, so the total is in [0, 1].

use serde::{Deserialize, Serialize};

pub const TERM_COUNT_WEIGHT: f64 = 0.30;
pub const TIMING_WEIGHT: f64 = 0.20;
pub const EXCLUSION_WEIGHT: f64 = 0.15;
pub const PRIOR_TESTS_WEIGHT: f64 = 0.20;
pub const FAMILY_HISTORY_WEIGHT: f64 = 0.15;

/// Raw signals gathered by the pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletenessSignals {
    pub resolved_terms: usize,
    /// Resolved terms with at least one associated timing record.
    pub timed_terms: usize,
    pub has_exclusion: bool,
    pub has_prior_tests: bool,
    pub has_family_history: bool,
}

/// Score with its unweighted components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletenessScore {
    pub score: f64,
    pub term_count: f64,
    pub timing_coverage: f64,
    pub exclusion: f64,
    pub prior_tests: f64,
    pub family_history: f64,
}

pub fn score(signals: &CompletenessSignals) -> CompletenessScore {
    let term_count = match signals.resolved_terms {
        0 => 0.0,
        1 | 2 => 0.5,
        _ => 1.0,
    };
    let timing_coverage = if signals.resolved_terms == 0 {
        0.0
    } else {
        (signals.timed_terms as f64 / signals.resolved_terms as f64).min(1.0)
    };
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    let exclusion = flag(signals.has_exclusion);
    let prior_tests = flag(signals.has_prior_tests);
    let family_history = flag(signals.has_family_history);

    let total = TERM_COUNT_WEIGHT * term_count
        + TIMING_WEIGHT * timing_coverage
        + EXCLUSION_WEIGHT * exclusion
        + PRIOR_TESTS_WEIGHT * prior_tests
        + FAMILY_HISTORY_WEIGHT * family_history;

    CompletenessScore {
        score: total.clamp(0.0, 1.0),
        term_count,
        timing_coverage,
        exclusion,
        prior_tests,
        family_history,
    }
}
