//! Text → ontology term resolution.
//!
//! Order, first match wins:
//! 1. input shaped like an ontology code → direct lookup by code only
//! 2. exact case-insensitive label/synonym match → `High`
//! 3. approximate match above the cutoff → tiered by score
//!
//! Anything else is unresolved (`None`). Callers keep unresolved input as an
//! explicit record.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::store::OntologyStore;
use super::types::TermId;
use crate::pipeline_config::ResolverConfig;

static DEFAULT_CODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^HP:\d{7}$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchConfidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Code,
    Exact,
    Approximate,
}

/// A successful resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTerm {
    pub code: String,
    pub label: String,
    pub definition: Option<String>,
    pub information_content: Option<f64>,
    /// Direct parent codes.
    pub parents: Vec<String>,
    pub confidence: MatchConfidence,
    pub method: MatchMethod,
    /// 0–100; 100 for code and exact matches.
    pub score: f64,
}

pub struct TermResolver {
    store: Arc<OntologyStore>,
    code_pattern: Regex,
    config: ResolverConfig,
}

impl TermResolver {
    pub fn new(store: Arc<OntologyStore>, config: ResolverConfig) -> Self {
        let code_pattern = match Regex::new(&config.code_pattern) {
            Ok(re) => re,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid code pattern, using default");
                DEFAULT_CODE_PATTERN.clone()
            }
        };
        Self {
            store,
            code_pattern,
            config,
        }
    }

    pub fn store(&self) -> &Arc<OntologyStore> {
        &self.store
    }

    pub fn is_code(&self, text: &str) -> bool {
        self.code_pattern.is_match(text.trim())
    }

    /// Resolve with the configured approximate-match cutoff.
    pub fn resolve(&self, text: &str) -> Option<ResolvedTerm> {
        self.resolve_with_cutoff(text, self.config.fuzzy_cutoff)
    }

    /// Resolve with an explicit approximate-match cutoff (0–100).
    pub fn resolve_with_cutoff(&self, text: &str, cutoff: f64) -> Option<ResolvedTerm> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if self.is_code(text) {
            return self
                .store
                .term_id(text)
                .map(|id| self.build(id, MatchConfidence::High, MatchMethod::Code, 100.0));
        }

        if let Some(id) = self.store.lookup_label(text) {
            return Some(self.build(id, MatchConfidence::High, MatchMethod::Exact, 100.0));
        }

        let (key, score) = self.best_approximate(&text.to_lowercase(), cutoff)?;
        let id = self.store.label_target(key)?;
        tracing::debug!(score, code = %self.store.term(id).code, "Approximate term match");
        Some(self.build(id, self.tier(score), MatchMethod::Approximate, score))
    }

    fn tier(&self, score: f64) -> MatchConfidence {
        if score >= self.config.high_threshold {
            MatchConfidence::High
        } else if score >= self.config.medium_threshold {
            MatchConfidence::Medium
        } else {
            MatchConfidence::Low
        }
    }

    /// Best-scoring key at or above `cutoff`. Keys are sorted, and only a
    /// strictly better score replaces the current best, so ties go to the
    /// lexicographically first key.
    fn best_approximate(&self, query: &str, cutoff: f64) -> Option<(&str, f64)> {
        let query_len = query.chars().count();
        let query_sorted = token_sorted(query);
        let mut best: Option<(&str, f64)> = None;

        for key in self.store.label_keys() {
            let key_len = key.chars().count();
            let floor = best.map_or(cutoff, |(_, s)| s.max(cutoff));
            if length_bound(query_len, key_len) < floor {
                continue;
            }
            let score = similarity(query, &query_sorted, key);
            if score >= cutoff && best.map_or(true, |(_, s)| score > s) {
                best = Some((key.as_str(), score));
            }
        }
        best
    }

    fn build(
        &self,
        id: TermId,
        confidence: MatchConfidence,
        method: MatchMethod,
        score: f64,
    ) -> ResolvedTerm {
        let term = self.store.term(id);
        ResolvedTerm {
            code: term.code.clone(),
            label: term.label.clone(),
            definition: term.definition.clone(),
            information_content: term.information_content,
            parents: term
                .parents
                .iter()
                .map(|p| self.store.term(*p).code.clone())
                .collect(),
            confidence,
            method,
            score,
        }
    }
}

/// Upper bound (0–100) on normalized Levenshtein similarity for two strings
/// of these lengths. Token sorting preserves length, so it bounds both scores.
fn length_bound(a: usize, b: usize) -> f64 {
    let longest = a.max(b);
    if longest == 0 {
        return 100.0;
    }
    (1.0 - a.abs_diff(b) as f64 / longest as f64) * 100.0
}

fn token_sorted(text: &str) -> String {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// 0–100 similarity: the better of plain and token-sorted normalized
/// Levenshtein.
fn similarity(query: &str, query_sorted: &str, key: &str) -> f64 {
    let plain = strsim::normalized_levenshtein(query, key);
    let sorted = strsim::normalized_levenshtein(query_sorted, &token_sorted(key));
    plain.max(sorted) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::fixtures;

    fn resolver() -> TermResolver {
        TermResolver::new(fixtures::store(), ResolverConfig::default())
    }

    #[test]
    fn code_resolves_directly() {
        let r = resolver().resolve("HP:0001250").unwrap();
        assert_eq!(r.label, "Seizure");
        assert_eq!(r.method, MatchMethod::Code);
        assert_eq!(r.confidence, MatchConfidence::High);
        assert_eq!(r.parents, vec!["HP:0012638".to_string()]);
    }

    #[test]
    fn unknown_code_is_unresolved() {
        assert!(resolver().resolve("HP:9999999").is_none());
    }

    #[test]
    fn exact_label_case_insensitive() {
        let r = resolver().resolve("  microCEPHALY ").unwrap();
        assert_eq!(r.code, "HP:0000252");
        assert_eq!(r.method, MatchMethod::Exact);
        assert_eq!(r.confidence, MatchConfidence::High);
    }

    #[test]
    fn synonym_matches_exactly() {
        let r = resolver().resolve("speech delay").unwrap();
        assert_eq!(r.code, "HP:0000750");
        assert_eq!(r.method, MatchMethod::Exact);
    }

    #[test]
    fn misspelling_resolves_approximately() {
        let r = resolver().resolve("hypotnia").unwrap();
        assert_eq!(r.code, "HP:0001252");
        assert_eq!(r.method, MatchMethod::Approximate);
        assert!(r.score >= 75.0 && r.score < 100.0);
    }

    #[test]
    fn word_order_tolerated() {
        let r = resolver().resolve("delay developmental global").unwrap();
        assert_eq!(r.code, "HP:0001263");
        assert_eq!(r.method, MatchMethod::Approximate);
        assert_eq!(r.confidence, MatchConfidence::High);
    }

    #[test]
    fn unrelated_text_is_unresolved() {
        assert!(resolver().resolve("the patient enjoys football").is_none());
        assert!(resolver().resolve("").is_none());
        assert!(resolver().resolve("   ").is_none());
    }

    #[test]
    fn tiers_follow_thresholds() {
        let r = resolver();
        assert_eq!(r.tier(90.0), MatchConfidence::High);
        assert_eq!(r.tier(85.0), MatchConfidence::High);
        assert_eq!(r.tier(80.0), MatchConfidence::Medium);
        assert_eq!(r.tier(50.0), MatchConfidence::Low);
    }

    #[test]
    fn stricter_cutoff_rejects_weaker_match() {
        let r = resolver();
        // "hypotnia" vs "hypotonia": 1 edit over 9 chars ≈ 88.9
        assert!(r.resolve_with_cutoff("hypotnia", 80.0).is_some());
        assert!(r.resolve_with_cutoff("hypotnia", 95.0).is_none());
    }

    #[test]
    fn invalid_code_pattern_falls_back() {
        let config = ResolverConfig {
            code_pattern: "([".into(),
            ..ResolverConfig::default()
        };
        let r = TermResolver::new(fixtures::store(), config);
        assert!(r.is_code("HP:0001250"));
    }

    #[test]
    fn length_bound_prunes() {
        assert_eq!(length_bound(0, 0), 100.0);
        assert!((length_bound(5, 10) - 50.0).abs() < 1e-9);
        assert_eq!(length_bound(7, 7), 100.0);
    }

    #[test]
    fn resolution_is_deterministic() {
        let r = resolver();
        let a = r.resolve("seizur");
        let b = r.resolve("seizur");
        assert_eq!(a, b);
        assert!(a.is_some());
    }
}
