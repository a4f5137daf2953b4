//! Immutable ontology store.
//!
//! Built once from a [`ReferenceSnapshot`]; every cross-reference is resolved
//! to an arena index at build time, so a store that exists is a store that is
//! internally consistent. Shared across requests behind an `Arc`.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use rayon::prelude::*;

use super::closure::{self, ClosureReport};
use super::types::{
    EntityId, EnrichmentRecord, OntologyTerm, ReferenceEntity, ReferenceSnapshot, TermId,
};
use super::StoreError;

pub struct OntologyStore {
    terms: Vec<OntologyTerm>,
    entities: Vec<ReferenceEntity>,
    code_index: HashMap<String, TermId>,
    entity_index: HashMap<String, EntityId>,
    /// Lowercased label/synonym -> term. Labels win over synonyms.
    label_index: HashMap<String, TermId>,
    /// Keys of `label_index`, sorted.
    label_keys: Vec<String>,
}

/// Entity with resolved annotations, before its closure is known.
struct PendingEntity {
    code: String,
    name: String,
    annotated: Vec<TermId>,
    ancestors: Option<Vec<TermId>>,
    enrichment: Option<EnrichmentRecord>,
}

impl OntologyStore {
    /// Validate a snapshot and build the store. Any inconsistency is fatal.
    pub fn build(snapshot: ReferenceSnapshot) -> Result<Self, StoreError> {
        let started = Instant::now();

        if snapshot.terms.is_empty() {
            return Err(StoreError::EmptySnapshot);
        }

        // Pass 1: codes and IC.
        let mut code_index = HashMap::with_capacity(snapshot.terms.len());
        for (i, record) in snapshot.terms.iter().enumerate() {
            if record.code.trim().is_empty() {
                return Err(StoreError::EmptyCode(i));
            }
            if let Some(ic) = record.information_content {
                if !ic.is_finite() || ic < 0.0 {
                    return Err(StoreError::InvalidInformationContent {
                        term: record.code.clone(),
                        value: ic,
                    });
                }
            }
            if code_index
                .insert(record.code.clone(), TermId(i as u32))
                .is_some()
            {
                return Err(StoreError::DuplicateTerm(record.code.clone()));
            }
        }

        // Pass 2: parent edges.
        let mut terms = Vec::with_capacity(snapshot.terms.len());
        for record in snapshot.terms {
            let mut parents = Vec::with_capacity(record.parents.len());
            for parent in &record.parents {
                let id = code_index
                    .get(parent)
                    .copied()
                    .ok_or_else(|| StoreError::DanglingParent {
                        term: record.code.clone(),
                        parent: parent.clone(),
                    })?;
                if !parents.contains(&id) {
                    parents.push(id);
                }
            }
            terms.push(OntologyTerm {
                code: record.code,
                label: record.label,
                synonyms: record.synonyms,
                parents,
                definition: record.definition,
                information_content: record.information_content,
            });
        }

        let label_index = build_label_index(&terms);
        let mut label_keys: Vec<String> = label_index.keys().cloned().collect();
        label_keys.sort_unstable();

        // Entities: resolve annotations sequentially, closures in parallel.
        let mut entity_index = HashMap::with_capacity(snapshot.entities.len());
        let mut pending = Vec::with_capacity(snapshot.entities.len());
        for (i, record) in snapshot.entities.into_iter().enumerate() {
            if entity_index
                .insert(record.code.clone(), EntityId(i as u32))
                .is_some()
            {
                return Err(StoreError::DuplicateEntity(record.code));
            }
            let annotated = resolve_codes(&code_index, &record.code, &record.annotated_terms)?;
            let ancestors = match &record.ancestor_terms {
                Some(codes) => Some(resolve_codes(&code_index, &record.code, codes)?),
                None => None,
            };
            pending.push(PendingEntity {
                code: record.code,
                name: record.name,
                annotated,
                ancestors,
                enrichment: record.enrichment,
            });
        }

        let precomputed = pending.iter().filter(|p| p.ancestors.is_some()).count();
        let entities: Vec<ReferenceEntity> = pending
            .into_par_iter()
            .map(|p| finish_entity(&terms, p))
            .collect();

        tracing::info!(
            terms = terms.len(),
            entities = entities.len(),
            precomputed_closures = precomputed,
            labels = label_keys.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Ontology store built"
        );

        Ok(Self {
            terms,
            entities,
            code_index,
            entity_index,
            label_index,
            label_keys,
        })
    }

    // ── Terms ──────────────────────────────────────────────

    pub fn term(&self, id: TermId) -> &OntologyTerm {
        &self.terms[id.index()]
    }

    pub fn term_id(&self, code: &str) -> Option<TermId> {
        self.code_index.get(code).copied()
    }

    pub fn term_by_code(&self, code: &str) -> Option<&OntologyTerm> {
        self.term_id(code).map(|id| self.term(id))
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Exact, case-insensitive label or synonym lookup.
    pub fn lookup_label(&self, text: &str) -> Option<TermId> {
        self.label_index.get(&text.trim().to_lowercase()).copied()
    }

    /// Sorted lowercase label/synonym keys, for approximate matching.
    pub fn label_keys(&self) -> &[String] {
        &self.label_keys
    }

    pub(crate) fn label_target(&self, key: &str) -> Option<TermId> {
        self.label_index.get(key).copied()
    }

    // ── Entities ───────────────────────────────────────────

    pub fn entities(&self) -> &[ReferenceEntity] {
        &self.entities
    }

    pub fn entity(&self, id: EntityId) -> &ReferenceEntity {
        &self.entities[id.index()]
    }

    pub fn entity_by_code(&self, code: &str) -> Option<&ReferenceEntity> {
        self.entity_index.get(code).map(|id| self.entity(*id))
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // ── Closure ────────────────────────────────────────────

    /// Ancestors of one term, itself included.
    pub fn ancestors_of(&self, id: TermId) -> Vec<TermId> {
        closure::ancestors_of(&self.terms, id)
    }

    /// Union closure of a set of term ids, sorted and deduplicated.
    pub fn closure_ids<I>(&self, ids: I) -> Vec<TermId>
    where
        I: IntoIterator<Item = TermId>,
    {
        closure::closure_of(&self.terms, ids)
    }

    /// Split codes into known ids and unknown codes (input order, deduplicated).
    pub fn partition_codes<'a, I>(&self, codes: I) -> (Vec<TermId>, Vec<String>)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut known = Vec::new();
        let mut unknown: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for code in codes {
            if !seen.insert(code) {
                continue;
            }
            match self.term_id(code) {
                Some(id) => known.push(id),
                None => unknown.push(code.to_string()),
            }
        }
        (known, unknown)
    }

    /// Closure over codes. Unknown codes are skipped and reported.
    pub fn closure_codes<'a, I>(&self, codes: I) -> ClosureReport
    where
        I: IntoIterator<Item = &'a str>,
    {
        let (known, unknown) = self.partition_codes(codes);
        if !unknown.is_empty() {
            tracing::warn!(count = unknown.len(), "Skipping unknown codes in closure");
        }
        let mut codes: Vec<String> = self
            .closure_ids(known)
            .into_iter()
            .map(|id| self.term(id).code.clone())
            .collect();
        codes.sort_unstable();
        ClosureReport { codes, unknown }
    }
}

impl std::fmt::Debug for OntologyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OntologyStore")
            .field("terms", &self.terms.len())
            .field("entities", &self.entities.len())
            .finish()
    }
}

fn build_label_index(terms: &[OntologyTerm]) -> HashMap<String, TermId> {
    let mut index = HashMap::new();
    for (i, term) in terms.iter().enumerate() {
        let key = term.label.trim().to_lowercase();
        if !key.is_empty() {
            index.entry(key).or_insert(TermId(i as u32));
        }
    }
    for (i, term) in terms.iter().enumerate() {
        for synonym in &term.synonyms {
            let key = synonym.trim().to_lowercase();
            if !key.is_empty() {
                index.entry(key).or_insert(TermId(i as u32));
            }
        }
    }
    index
}

fn resolve_codes(
    index: &HashMap<String, TermId>,
    entity: &str,
    codes: &[String],
) -> Result<Vec<TermId>, StoreError> {
    let mut ids = codes
        .iter()
        .map(|code| {
            index
                .get(code)
                .copied()
                .ok_or_else(|| StoreError::DanglingAnnotation {
                    entity: entity.to_string(),
                    term: code.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

fn finish_entity(terms: &[OntologyTerm], pending: PendingEntity) -> ReferenceEntity {
    let ancestors = match pending.ancestors {
        Some(mut supplied) => {
            // A supplied closure must still contain the annotations themselves.
            supplied.extend_from_slice(&pending.annotated);
            supplied.sort_unstable();
            supplied.dedup();
            supplied
        }
        None => closure::closure_of(terms, pending.annotated.iter().copied()),
    };
    ReferenceEntity {
        code: pending.code,
        name: pending.name,
        annotated: pending.annotated.into_boxed_slice(),
        ancestors: ancestors.into_boxed_slice(),
        enrichment: pending.enrichment,
    }
}
