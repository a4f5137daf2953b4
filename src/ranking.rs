//! IC-weighted similarity ranking of reference entities.
//!
//! score(entity) = Σ IC(t) for t in closure(observed) ∩ ancestors(entity),
//! halved when the entity is annotated with any excluded term. Results are
//! ordered by score descending, then reference code ascending, and carry
//! dense 1-based ranks. The ranking is a pure function of its inputs and the
//! store.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ontology::{EntityId, OntologyStore, ReferenceEntity, TermId};

/// Multiplier applied to entities annotated with an excluded term.
pub const EXCLUSION_PENALTY: f64 = 0.5;

/// One ranked reference entity with its evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub rank: usize,
    pub code: String,
    pub name: String,
    pub score: f64,
    /// Observed ∩ annotated.
    pub matched: Vec<String>,
    /// Annotated − observed.
    pub missing: Vec<String>,
    /// Observed − annotated.
    pub extra: Vec<String>,
    /// |matched| / |annotated|; 0 when the entity has no annotations.
    pub coverage: f64,
    pub excluded_penalty: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingOutcome {
    pub results: Vec<MatchResult>,
    /// Observed or excluded codes the store does not know, skipped.
    pub unknown_codes: Vec<String>,
}

pub struct SimilarityRanker {
    store: Arc<OntologyStore>,
    top_n: usize,
}

impl SimilarityRanker {
    pub fn new(store: Arc<OntologyStore>, top_n: usize) -> Self {
        Self { store, top_n }
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Rank without exclusions.
    pub fn rank_observed(&self, observed: &[String]) -> RankingOutcome {
        self.rank(observed, &[])
    }

    pub fn rank(&self, observed: &[String], excluded: &[String]) -> RankingOutcome {
        let started = Instant::now();

        let (mut observed_ids, mut unknown_codes) =
            self.store.partition_codes(observed.iter().map(String::as_str));
        let (mut excluded_ids, unknown_excluded) =
            self.store.partition_codes(excluded.iter().map(String::as_str));
        for code in unknown_excluded {
            if !unknown_codes.contains(&code) {
                unknown_codes.push(code);
            }
        }
        if !unknown_codes.is_empty() {
            tracing::warn!(count = unknown_codes.len(), "Ranking skipped unknown codes");
        }

        if observed_ids.is_empty() {
            return RankingOutcome {
                results: Vec::new(),
                unknown_codes,
            };
        }

        observed_ids.sort_unstable();
        excluded_ids.sort_unstable();
        let query_closure = self.store.closure_ids(observed_ids.iter().copied());

        let mut scored: Vec<(EntityId, f64, bool)> = self
            .store
            .entities()
            .par_iter()
            .enumerate()
            .map(|(i, entity)| {
                let raw = self.raw_score(&query_closure, entity);
                let penalized = !excluded_ids.is_empty()
                    && excluded_ids.iter().any(|t| entity.is_annotated_with(*t));
                let score = if penalized { raw * EXCLUSION_PENALTY } else { raw };
                (EntityId(i as u32), score, penalized)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| self.store.entity(a.0).code.cmp(&self.store.entity(b.0).code))
        });
        scored.truncate(self.top_n);

        let results: Vec<MatchResult> = scored
            .into_iter()
            .enumerate()
            .map(|(i, (id, score, penalized))| {
                self.build_result(i + 1, self.store.entity(id), score, penalized, &observed_ids)
            })
            .collect();

        tracing::debug!(
            observed = observed_ids.len(),
            excluded = excluded_ids.len(),
            closure = query_closure.len(),
            entities = self.store.entity_count(),
            returned = results.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Ranking complete"
        );

        RankingOutcome {
            results,
            unknown_codes,
        }
    }

    fn raw_score(&self, query_closure: &[TermId], entity: &ReferenceEntity) -> f64 {
        query_closure
            .iter()
            .filter(|t| entity.has_ancestor(**t))
            .map(|t| self.store.term(*t).ic())
            .sum()
    }

    fn build_result(
        &self,
        rank: usize,
        entity: &ReferenceEntity,
        score: f64,
        penalized: bool,
        observed: &[TermId],
    ) -> MatchResult {
        let codes = |ids: &mut dyn Iterator<Item = TermId>| -> Vec<String> {
            let mut out: Vec<String> = ids.map(|id| self.store.term(id).code.clone()).collect();
            out.sort_unstable();
            out
        };

        let matched = codes(&mut observed.iter().copied().filter(|t| entity.is_annotated_with(*t)));
        let missing = codes(
            &mut entity
                .annotated
                .iter()
                .copied()
                .filter(|t| observed.binary_search(t).is_err()),
        );
        let extra = codes(&mut observed.iter().copied().filter(|t| !entity.is_annotated_with(*t)));
        let coverage = if entity.annotated.is_empty() {
            0.0
        } else {
            matched.len() as f64 / entity.annotated.len() as f64
        };

        MatchResult {
            rank,
            code: entity.code.clone(),
            name: entity.name.clone(),
            score,
            matched,
            missing,
            extra,
            coverage,
            excluded_penalty: penalized,
        }
    }
}
