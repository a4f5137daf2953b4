//! Small HPO-shaped ontology and corpus shared by unit tests.

use std::sync::Arc;

use super::store::OntologyStore;
use super::types::{
    EnrichmentRecord, EntityRecord, PhenotypeFrequency, ReferenceSnapshot, TermRecord,
};

fn term(code: &str, label: &str, parents: &[&str], ic: Option<f64>, synonyms: &[&str]) -> TermRecord {
    TermRecord {
        code: code.into(),
        label: label.into(),
        synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
        parents: parents.iter().map(|p| p.to_string()).collect(),
        definition: None,
        information_content: ic,
    }
}

fn entity(code: &str, name: &str, annotated: &[&str], enrichment: Option<EnrichmentRecord>) -> EntityRecord {
    EntityRecord {
        code: code.into(),
        name: name.into(),
        annotated_terms: annotated.iter().map(|c| c.to_string()).collect(),
        ancestor_terms: None,
        enrichment,
    }
}

pub fn snapshot() -> ReferenceSnapshot {
    let terms = vec![
        term("HP:0000001", "All", &[], None, &[]),
        term("HP:0000118", "Phenotypic abnormality", &["HP:0000001"], Some(0.0), &[]),
        term("HP:0000707", "Abnormality of the nervous system", &["HP:0000118"], Some(0.1), &[]),
        term("HP:0012638", "Abnormal nervous system physiology", &["HP:0000707"], Some(0.3), &[]),
        term("HP:0001250", "Seizure", &["HP:0012638"], Some(2.0), &["Seizures", "Epileptic seizure"]),
        term("HP:0002133", "Status epilepticus", &["HP:0001250"], Some(4.0), &[]),
        term("HP:0001279", "Syncope", &["HP:0012638"], Some(2.1), &["Fainting"]),
        term("HP:0001259", "Coma", &["HP:0012638"], Some(3.2), &[]),
        term("HP:0012759", "Neurodevelopmental abnormality", &["HP:0000707"], Some(0.5), &[]),
        term("HP:0001263", "Global developmental delay", &["HP:0012759"], Some(1.2), &["Developmental delay"]),
        term("HP:0000750", "Delayed speech and language development", &["HP:0012759"], Some(1.6), &["Speech delay"]),
        term("HP:0000240", "Abnormality of skull size", &["HP:0000118"], Some(0.8), &[]),
        term("HP:0000252", "Microcephaly", &["HP:0000240"], Some(3.0), &["Small head"]),
        term("HP:0003011", "Abnormality of the musculature", &["HP:0000118"], Some(0.3), &[]),
        term("HP:0001252", "Hypotonia", &["HP:0003011"], Some(1.5), &["Muscle hypotonia", "Low muscle tone"]),
        term("HP:0001626", "Abnormality of the cardiovascular system", &["HP:0000118"], Some(0.2), &[]),
        term("HP:0001638", "Cardiomyopathy", &["HP:0001626"], Some(2.5), &[]),
        term("HP:0001695", "Cardiac arrest", &["HP:0001626"], Some(3.5), &[]),
        term("HP:0001939", "Abnormality of metabolism/homeostasis", &["HP:0000118"], Some(0.2), &[]),
        term("HP:0001942", "Metabolic acidosis", &["HP:0001939"], Some(2.2), &[]),
        term("HP:0000365", "Hearing impairment", &["HP:0000118"], Some(1.8), &["Deafness", "Hearing loss"]),
        term("HP:0002098", "Respiratory distress", &["HP:0000118"], Some(2.0), &[]),
    ];

    let entities = vec![
        entity(
            "ORPHA:1",
            "Dravet syndrome",
            &["HP:0001250", "HP:0001263", "HP:0001252"],
            Some(EnrichmentRecord {
                inheritance: Some("Autosomal dominant".into()),
                genes: vec!["SCN1A".into()],
                phenotype_frequencies: vec![PhenotypeFrequency {
                    code: "HP:0001250".into(),
                    label: "Seizure".into(),
                    frequency: "100%".into(),
                }],
                recommended_tests: vec!["Epilepsy gene panel".into()],
            }),
        ),
        entity(
            "ORPHA:2",
            "Primary microcephaly",
            &["HP:0000252", "HP:0001263", "HP:0000750"],
            None,
        ),
        entity(
            "ORPHA:3",
            "Glycogen storage disease type II",
            &["HP:0001638", "HP:0001252"],
            Some(EnrichmentRecord {
                inheritance: Some("Autosomal recessive".into()),
                genes: vec!["GAA".into()],
                phenotype_frequencies: vec![],
                recommended_tests: vec!["Acid alpha-glucosidase enzyme assay".into()],
            }),
        ),
        entity(
            "ORPHA:4",
            "Pyruvate dehydrogenase deficiency",
            &["HP:0001942", "HP:0001250", "HP:0001252", "HP:0001263"],
            None,
        ),
        entity("ORPHA:5", "Unannotated entity", &[], None),
    ];

    ReferenceSnapshot { terms, entities }
}

pub fn store() -> Arc<OntologyStore> {
    Arc::new(OntologyStore::build(snapshot()).unwrap())
}

/// Two unrelated terms (Seizures 2.0, Microcephaly 3.0) and one entity
/// annotated with both.
pub fn two_term_store() -> Arc<OntologyStore> {
    let snapshot = ReferenceSnapshot {
        terms: vec![
            term("HP:0001250", "Seizures", &[], Some(2.0), &[]),
            term("HP:0000252", "Microcephaly", &[], Some(3.0), &[]),
        ],
        entities: vec![entity("ORPHA:10", "Scenario entity", &["HP:0001250", "HP:0000252"], None)],
    };
    Arc::new(OntologyStore::build(snapshot).unwrap())
}
