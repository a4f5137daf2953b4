//! Deterministic red-flag gate.
//!
//! A fixed, hand-authored rule table evaluated over ontology ancestor
//! membership. No learned or probabilistic component, no external calls.

pub mod gate;
pub mod rules;

pub use gate::SafetyGate;

use serde::{Deserialize, Serialize};

/// Action priority of a flag. `Ord` follows priority: `Urgent` is greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Watch,
    Warning,
    Urgent,
}

/// One fired rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyFlag {
    /// Stable rule identifier for the audit trail.
    pub rule_id: String,
    pub label: String,
    pub severity: Severity,
    /// Observed codes that caused the rule to fire. Never empty.
    pub triggering_terms: Vec<String>,
    pub recommended_action: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyReport {
    /// Sorted by severity (`Urgent` first), then rule table order.
    pub flags: Vec<SafetyFlag>,
    /// Observed codes unknown to the ontology, skipped.
    pub unknown_codes: Vec<String>,
}

impl SafetyReport {
    pub fn highest_severity(&self) -> Option<Severity> {
        highest_severity(&self.flags)
    }

    pub fn is_urgent(&self) -> bool {
        self.highest_severity() == Some(Severity::Urgent)
    }
}

pub fn highest_severity(flags: &[SafetyFlag]) -> Option<Severity> {
    flags.iter().map(|f| f.severity).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flag(severity: Severity) -> SafetyFlag {
        SafetyFlag {
            rule_id: "RF-TEST".into(),
            label: "test".into(),
            severity,
            triggering_terms: vec!["HP:0000001".into()],
            recommended_action: "none".into(),
        }
    }

    #[test]
    fn severity_order() {
        assert!(Severity::Urgent > Severity::Warning);
        assert!(Severity::Warning > Severity::Watch);
    }

    #[test]
    fn severity_wire_names() {
        assert_eq!(serde_json::to_string(&Severity::Urgent).unwrap(), "\"URGENT\"");
        assert_eq!(serde_json::to_string(&Severity::Watch).unwrap(), "\"WATCH\"");
    }

    #[test]
    fn highest_of_mixed_flags() {
        let flags = vec![flag(Severity::Watch), flag(Severity::Urgent), flag(Severity::Warning)];
        assert_eq!(highest_severity(&flags), Some(Severity::Urgent));
        assert_eq!(highest_severity(&[]), None);
    }
}
