//! Phenotype ontology and reference corpus.
//!
//! The store is built once from a reference snapshot and shared read-only
//! across every analysis. Terms and entities live in arenas and refer to each
//! other by index, never by pointer.

pub mod types;
pub mod closure;
pub mod store;
pub mod loader;
pub mod resolver;

#[cfg(test)]
pub(crate) mod fixtures;

pub use closure::ClosureReport;
pub use loader::{InMemoryProvider, JsonSnapshotProvider, ReferenceDataProvider};
pub use resolver::{MatchConfidence, MatchMethod, ResolvedTerm, TermResolver};
pub use store::OntologyStore;
pub use types::*;

use thiserror::Error;

/// Load-time failures. Any of these aborts store construction.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Reference snapshot contains no ontology terms")]
    EmptySnapshot,

    #[error("Empty term code at position {0}")]
    EmptyCode(usize),

    #[error("Duplicate term code: {0}")]
    DuplicateTerm(String),

    #[error("Duplicate reference entity code: {0}")]
    DuplicateEntity(String),

    #[error("Term {term} lists unknown parent {parent}")]
    DanglingParent { term: String, parent: String },

    #[error("Entity {entity} references unknown term {term}")]
    DanglingAnnotation { entity: String, term: String },

    #[error("Term {term} has invalid information content {value}")]
    InvalidInformationContent { term: String, value: f64 },

    #[error("Cannot read reference snapshot {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Cannot parse reference snapshot {path}: {reason}")]
    Parse { path: String, reason: String },
}
