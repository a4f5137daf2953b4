use std::sync::Arc;

use crate::ontology::{EnrichmentRecord, OntologyStore};

use super::traits::EnrichmentLookup;

/// Serves enrichment bundled with the reference snapshot. An entity with an
/// empty record counts as not found.
pub struct StoreEnrichmentLookup {
    store: Arc<OntologyStore>,
}

impl StoreEnrichmentLookup {
    pub fn new(store: Arc<OntologyStore>) -> Self {
        Self { store }
    }
}

impl EnrichmentLookup for StoreEnrichmentLookup {
    fn fetch(&self, reference_code: &str) -> Option<EnrichmentRecord> {
        let entity = self.store.entity_by_code(reference_code)?;
        entity
            .enrichment
            .as_ref()
            .filter(|record| **record != EnrichmentRecord::default())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::fixtures;

    #[test]
    fn returns_bundled_enrichment() {
        let lookup = StoreEnrichmentLookup::new(fixtures::store());
        let record = lookup.fetch("ORPHA:3").unwrap();
        assert_eq!(record.genes, vec!["GAA"]);
        assert_eq!(record.recommended_tests, vec!["Acid alpha-glucosidase enzyme assay"]);
    }

    #[test]
    fn missing_enrichment_is_none() {
        let lookup = StoreEnrichmentLookup::new(fixtures::store());
        assert!(lookup.fetch("ORPHA:2").is_none());
        assert!(lookup.fetch("ORPHA:1").is_some());
    }

    #[test]
    fn empty_or_unknown_is_none() {
        let lookup = StoreEnrichmentLookup::new(fixtures::store());
        assert!(lookup.fetch("ORPHA:5").is_none());
        assert!(lookup.fetch("ORPHA:999").is_none());
    }
}
