//! Red-flag evaluation: matches observed codes against the rule table by
//! ancestor closure and reports flags ordered by severity.

use std::collections::HashSet;
use std::sync::Arc;

use crate::ontology::{OntologyStore, TermId};

use super::rules::{RedFlagRule, RuleCondition, RULES};
use super::{SafetyFlag, SafetyReport};

/// Evaluates the red-flag table against observed codes.
pub struct SafetyGate {
    store: Arc<OntologyStore>,
}

impl SafetyGate {
    pub fn new(store: Arc<OntologyStore>) -> Self {
        Self { store }
    }

    /// Pure classification: same codes in, same flags out.
    pub fn evaluate(&self, observed: &[String]) -> SafetyReport {
        let (known, unknown_codes) = self
            .store
            .partition_codes(observed.iter().map(String::as_str));
        if !unknown_codes.is_empty() {
            tracing::warn!(count = unknown_codes.len(), "Safety gate skipped unknown codes");
        }

        // (observed term, its closure)
        let closures: Vec<(TermId, HashSet<TermId>)> = known
            .iter()
            .map(|id| (*id, self.store.ancestors_of(*id).into_iter().collect()))
            .collect();

        let mut flags: Vec<SafetyFlag> = RULES
            .iter()
            .filter_map(|rule| self.check(rule, &closures))
            .collect();
        // Stable: table order within a severity.
        flags.sort_by(|a, b| b.severity.cmp(&a.severity));

        for flag in &flags {
            tracing::warn!(
                rule_id = %flag.rule_id,
                severity = ?flag.severity,
                triggers = flag.triggering_terms.len(),
                "Red flag rule fired"
            );
        }

        SafetyReport {
            flags,
            unknown_codes,
        }
    }

    fn check(
        &self,
        rule: &RedFlagRule,
        closures: &[(TermId, HashSet<TermId>)],
    ) -> Option<SafetyFlag> {
        let triggering: Vec<TermId> = match &rule.condition {
            RuleCondition::Subtree { root } => {
                let root = self.store.term_id(root)?;
                closures
                    .iter()
                    .filter(|(_, closure)| closure.contains(&root))
                    .map(|(id, _)| *id)
                    .collect()
            }
            RuleCondition::Combination { roots } => {
                let roots: Vec<TermId> = roots
                    .iter()
                    .map(|code| self.store.term_id(code))
                    .collect::<Option<_>>()?;
                let covered = roots
                    .iter()
                    .all(|root| closures.iter().any(|(_, closure)| closure.contains(root)));
                if !covered {
                    return None;
                }
                closures
                    .iter()
                    .filter(|(_, closure)| roots.iter().any(|root| closure.contains(root)))
                    .map(|(id, _)| *id)
                    .collect()
            }
        };

        if triggering.is_empty() {
            return None;
        }

        Some(SafetyFlag {
            rule_id: rule.id.to_string(),
            label: rule.label.to_string(),
            severity: rule.severity,
            triggering_terms: triggering
                .into_iter()
                .map(|id| self.store.term(id).code.clone())
                .collect(),
            recommended_action: rule.action.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::fixtures;
    use crate::safety::Severity;

    fn gate() -> SafetyGate {
        SafetyGate::new(fixtures::store())
    }

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn status_epilepticus_is_urgent() {
        let report = gate().evaluate(&codes(&["HP:0002133"]));
        assert!(report.is_urgent());
        let flag = &report.flags[0];
        assert_eq!(flag.rule_id, "RF-SUB-003");
        assert_eq!(flag.triggering_terms, codes(&["HP:0002133"]));
    }

    #[test]
    fn parent_of_root_does_not_fire() {
        // Seizure is an ancestor of status epilepticus, not a descendant.
        let report = gate().evaluate(&codes(&["HP:0001250"]));
        assert!(report.flags.is_empty());
    }

    #[test]
    fn syncope_is_warning_only() {
        let report = gate().evaluate(&codes(&["HP:0001279"]));
        assert_eq!(report.flags.len(), 1);
        assert_eq!(report.highest_severity(), Some(Severity::Warning));
        assert!(!report.is_urgent());
    }

    #[test]
    fn combination_requires_every_root() {
        let report = gate().evaluate(&codes(&["HP:0001638"]));
        assert!(report.flags.is_empty());

        let report = gate().evaluate(&codes(&["HP:0001638", "HP:0001252"]));
        assert_eq!(report.flags.len(), 1);
        let flag = &report.flags[0];
        assert_eq!(flag.label, "Possible metabolic cardiomyopathy");
        assert_eq!(flag.triggering_terms, codes(&["HP:0001638", "HP:0001252"]));
    }

    #[test]
    fn three_way_combination() {
        let report = gate().evaluate(&codes(&["HP:0001250", "HP:0001263", "HP:0001942"]));
        assert_eq!(report.flags.len(), 1);
        assert_eq!(report.flags[0].rule_id, "RF-COMBO-002");
        assert_eq!(report.flags[0].triggering_terms.len(), 3);
    }

    #[test]
    fn urgent_sorted_before_warning() {
        let report = gate().evaluate(&codes(&["HP:0001279", "HP:0001695"]));
        let severities: Vec<_> = report.flags.iter().map(|f| f.severity).collect();
        assert_eq!(severities, vec![Severity::Urgent, Severity::Warning]);
    }

    #[test]
    fn unknown_codes_skipped() {
        let report = gate().evaluate(&codes(&["HP:9999999", "HP:0002098"]));
        assert_eq!(report.unknown_codes, codes(&["HP:9999999"]));
        assert!(report.is_urgent());
    }

    #[test]
    fn empty_input_no_flags() {
        let report = gate().evaluate(&[]);
        assert!(report.flags.is_empty());
        assert_eq!(report.highest_severity(), None);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let observed = codes(&["HP:0001695", "HP:0001279", "HP:0001638", "HP:0001252"]);
        let gate = gate();
        assert_eq!(gate.evaluate(&observed), gate.evaluate(&observed));
    }

    #[test]
    fn one_flag_per_subtree_rule() {
        // Duplicate input collapses to a single trigger.
        let report = gate().evaluate(&codes(&["HP:0001695", "HP:0001695"]));
        assert_eq!(report.flags.len(), 1);
        assert_eq!(report.flags[0].triggering_terms, codes(&["HP:0001695"]));
    }
}
