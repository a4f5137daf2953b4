//! Pipeline configuration.
//!
//! Holds the tunables of a single analysis run: how many candidates are kept,
//! how aggressively free text is matched against the ontology, and how long
//! each external call may take before the pipeline falls back.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Term resolution thresholds.
///
/// Scores are on a 0–100 scale. The cutoff rejects weak approximate matches;
/// accepted matches are tiered by the medium/high thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Pattern that marks input as an ontology code (direct lookup only).
    pub code_pattern: String,
    /// Minimum approximate score for a match to be accepted.
    pub fuzzy_cutoff: f64,
    /// Score at or above which an accepted match is `medium`.
    pub medium_threshold: f64,
    /// Score at or above which an accepted match is `high`.
    pub high_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            code_pattern: r"^HP:\d{7}$".to_string(),
            fuzzy_cutoff: 75.0,
            medium_threshold: 75.0,
            high_threshold: 85.0,
        }
    }
}

/// Configuration for one `DiagnosticPipeline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum ranked candidates returned.
    pub top_n: usize,
    /// Candidates whose enrichment profile is fetched.
    pub profile_fetch_count: usize,
    pub resolver: ResolverConfig,
    /// Approximate-match cutoff used when mapping extracted exclusions.
    pub exclusion_match_cutoff: f64,
    /// Timeout for each text-extraction call.
    pub extraction_timeout_ms: u64,
    /// Timeout for each enrichment lookup.
    pub profile_timeout_ms: u64,
    /// Timeout for the synthesis call.
    pub synthesis_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_n: 15,
            profile_fetch_count: 5,
            resolver: ResolverConfig::default(),
            exclusion_match_cutoff: 80.0,
            extraction_timeout_ms: 30_000,
            profile_timeout_ms: 2_000,
            synthesis_timeout_ms: 60_000,
        }
    }
}

impl PipelineConfig {
    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_millis(self.extraction_timeout_ms)
    }

    pub fn profile_timeout(&self) -> Duration {
        Duration::from_millis(self.profile_timeout_ms)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_millis(self.synthesis_timeout_ms)
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
