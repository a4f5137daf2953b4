use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Arena indices
// ---------------------------------------------------------------------------

/// Index of a term inside the store's term arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TermId(pub(crate) u32);

impl TermId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a reference entity inside the store's entity arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub(crate) u32);

impl EntityId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// OntologyTerm
// ---------------------------------------------------------------------------

/// A node of the phenotype taxonomy. Immutable once the store is built.
#[derive(Debug, Clone)]
pub struct OntologyTerm {
    pub code: String,
    pub label: String,
    pub synonyms: Vec<String>,
    /// Direct "is-a" parents.
    pub parents: Vec<TermId>,
    pub definition: Option<String>,
    /// `None` means unknown; scored as 0.0.
    pub information_content: Option<f64>,
}

impl OntologyTerm {
    /// Information content used in scoring.
    pub fn ic(&self) -> f64 {
        self.information_content.unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// ReferenceEntity
// ---------------------------------------------------------------------------

/// A cataloged condition annotated with ontology terms.
#[derive(Debug, Clone)]
pub struct ReferenceEntity {
    pub code: String,
    pub name: String,
    /// Directly annotated terms, sorted and deduplicated.
    pub annotated: Box<[TermId]>,
    /// Transitive ancestor closure of `annotated`, sorted and deduplicated.
    pub ancestors: Box<[TermId]>,
    pub enrichment: Option<EnrichmentRecord>,
}

impl ReferenceEntity {
    pub fn is_annotated_with(&self, term: TermId) -> bool {
        self.annotated.binary_search(&term).is_ok()
    }

    pub fn has_ancestor(&self, term: TermId) -> bool {
        self.ancestors.binary_search(&term).is_ok()
    }
}

/// Optional per-entity enrichment (inheritance, genes, frequencies, tests).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    #[serde(default)]
    pub inheritance: Option<String>,
    #[serde(default)]
    pub genes: Vec<String>,
    #[serde(default)]
    pub phenotype_frequencies: Vec<PhenotypeFrequency>,
    #[serde(default)]
    pub recommended_tests: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhenotypeFrequency {
    pub code: String,
    pub label: String,
    /// Free-form frequency band, e.g. "80-99%".
    pub frequency: String,
}

// ---------------------------------------------------------------------------
// Snapshot records (wire format of the reference-data provider)
// ---------------------------------------------------------------------------

/// Full reference snapshot: taxonomy plus corpus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceSnapshot {
    pub terms: Vec<TermRecord>,
    #[serde(default)]
    pub entities: Vec<EntityRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermRecord {
    pub code: String,
    pub label: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub definition: Option<String>,
    #[serde(default, alias = "ic_score")]
    pub information_content: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub code: String,
    pub name: String,
    #[serde(default, alias = "hpo_terms")]
    pub annotated_terms: Vec<String>,
    /// Precomputed closure; computed at load when absent.
    #[serde(default, alias = "ancestor_terms")]
    pub ancestor_terms: Option<Vec<String>>,
    #[serde(default)]
    pub enrichment: Option<EnrichmentRecord>,
}
