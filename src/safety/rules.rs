//! Red-flag rule table.
//!
//! Subtree rules fire when an observed term sits at or under a root.
//! Combination rules fire when the observed terms, together, reach every
//! listed category root. Urgent rules come first.

use super::Severity;

pub struct RedFlagRule {
    /// Unique identifier for audit trail.
    pub id: &'static str,
    pub label: &'static str,
    pub condition: RuleCondition,
    pub severity: Severity,
    pub action: &'static str,
}

pub enum RuleCondition {
    /// Any observed term whose closure contains `root`.
    Subtree { root: &'static str },
    /// Closures of the observed terms jointly contain every root.
    Combination { roots: &'static [&'static str] },
}

// ── Rule registry ───────────────────────────────────────────

pub static RULES: &[RedFlagRule] = &[
    RedFlagRule {
        id: "RF-SUB-001",
        label: "Cardiac arrest",
        condition: RuleCondition::Subtree { root: "HP:0001695" },
        severity: Severity::Urgent,
        action: "Immediate cardiac monitoring and resuscitation readiness",
    },
    RedFlagRule {
        id: "RF-SUB-002",
        label: "Respiratory distress",
        condition: RuleCondition::Subtree { root: "HP:0002098" },
        severity: Severity::Urgent,
        action: "Assess airway and breathing; consider respiratory support",
    },
    RedFlagRule {
        id: "RF-SUB-003",
        label: "Status epilepticus",
        condition: RuleCondition::Subtree { root: "HP:0002133" },
        severity: Severity::Urgent,
        action: "Urgent neurology consult; initiate seizure protocol",
    },
    RedFlagRule {
        id: "RF-SUB-004",
        label: "Coma",
        condition: RuleCondition::Subtree { root: "HP:0001259" },
        severity: Severity::Urgent,
        action: "Immediate neurological assessment and ICU evaluation",
    },
    RedFlagRule {
        id: "RF-SUB-005",
        label: "Syncope",
        condition: RuleCondition::Subtree { root: "HP:0001279" },
        severity: Severity::Warning,
        action: "Cardiac and neurological workup recommended",
    },
    RedFlagRule {
        id: "RF-SUB-006",
        label: "Neonatal onset",
        condition: RuleCondition::Subtree { root: "HP:0006579" },
        severity: Severity::Warning,
        action: "Neonatal onset detected; consider early metabolic and genetic screening",
    },
    RedFlagRule {
        id: "RF-SUB-007",
        label: "Clinical deterioration",
        condition: RuleCondition::Subtree { root: "HP:0003812" },
        severity: Severity::Warning,
        action: "Monitor for progressive decline; reassess diagnosis",
    },
    RedFlagRule {
        id: "RF-COMBO-001",
        label: "Possible metabolic cardiomyopathy",
        condition: RuleCondition::Combination {
            roots: &["HP:0001626", "HP:0003011"],
        },
        severity: Severity::Warning,
        action: "Consider metabolic cardiomyopathy workup",
    },
    RedFlagRule {
        id: "RF-COMBO-002",
        label: "Possible metabolic epilepsy",
        condition: RuleCondition::Combination {
            roots: &["HP:0001250", "HP:0012759", "HP:0001939"],
        },
        severity: Severity::Warning,
        action: "Consider urgent metabolic screening",
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn rule_ids_unique() {
        let ids: HashSet<_> = RULES.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), RULES.len());
    }

    #[test]
    fn urgent_rules_precede_others() {
        let first_non_urgent = RULES
            .iter()
            .position(|r| r.severity != Severity::Urgent)
            .unwrap();
        assert!(RULES[first_non_urgent..]
            .iter()
            .all(|r| r.severity != Severity::Urgent));
    }

    #[test]
    fn combination_rules_have_multiple_roots() {
        for rule in RULES {
            if let RuleCondition::Combination { roots } = rule.condition {
                assert!(roots.len() >= 2, "{} needs co-occurrence", rule.id);
            }
        }
    }

    #[test]
    fn status_epilepticus_is_urgent() {
        let rule = RULES
            .iter()
            .find(|r| matches!(r.condition, RuleCondition::Subtree { root } if root == "HP:0002133"))
            .unwrap();
        assert_eq!(rule.severity, Severity::Urgent);
    }
}
