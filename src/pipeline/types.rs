use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::completeness::CompletenessScore;
use crate::ontology::{EnrichmentRecord, ResolvedTerm};
use crate::ranking::MatchResult;
use crate::safety::SafetyFlag;

// ═══════════════════════════════════════════════════════════
// Request
// ═══════════════════════════════════════════════════════════

/// One analysis request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryProfile {
    /// Observed phenotypes: ontology codes or labels.
    #[serde(default)]
    pub observed: Vec<String>,
    /// Explicitly excluded ontology codes.
    #[serde(default)]
    pub excluded: Vec<String>,
    #[serde(default)]
    pub free_text: Option<String>,
    /// Age in years.
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub sex: Option<Sex>,
    #[serde(default)]
    pub prior_tests: Vec<PriorTest>,
    #[serde(default)]
    pub family_history: Option<String>,
}

impl QueryProfile {
    /// Free text, if present and not blank.
    pub fn text(&self) -> Option<&str> {
        self.free_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn has_prior_tests(&self) -> bool {
        !self.prior_tests.is_empty()
    }

    pub fn has_family_history(&self) -> bool {
        self.family_history
            .as_deref()
            .is_some_and(|h| !h.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Female,
    Male,
    Other,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorTest {
    pub name: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

// ═══════════════════════════════════════════════════════════
// Stage outputs
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhenotypeSource {
    Structured,
    FreeText,
}

/// One input item after term mapping. `term` is `None` when unresolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedPhenotype {
    pub input: String,
    pub source: PhenotypeSource,
    pub term: Option<ResolvedTerm>,
}

impl MappedPhenotype {
    pub fn code(&self) -> Option<&str> {
        self.term.as_ref().map(|t| t.code.as_str())
    }

    pub fn is_mapped(&self) -> bool {
        self.term.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExclusionType {
    #[default]
    Explicit,
    Soft,
}

/// A negated finding from free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionFinding {
    pub raw_text: String,
    pub finding: String,
    pub exclusion_type: ExclusionType,
    pub confidence: Confidence,
    pub mapped_code: Option<String>,
    pub mapped_label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnsetStage {
    #[serde(rename = "Congenital/Neonatal")]
    CongenitalNeonatal,
    Infantile,
    Childhood,
    Juvenile,
    Adult,
}

impl OnsetStage {
    /// Stage for an onset age in years (0.0 = birth).
    pub fn from_years(years: f64) -> Self {
        if years <= 0.0 {
            Self::CongenitalNeonatal
        } else if years <= 1.0 {
            Self::Infantile
        } else if years <= 5.0 {
            Self::Childhood
        } else if years <= 15.0 {
            Self::Juvenile
        } else {
            Self::Adult
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Progression {
    #[default]
    Stable,
    Progressive,
    Improving,
    Episodic,
}

/// Onset and course of one phenotype, from free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingRecord {
    /// Phenotype label or code the record refers to.
    pub phenotype_ref: String,
    pub onset: String,
    /// Onset age in years.
    pub onset_normalized: f64,
    pub onset_stage: OnsetStage,
    pub resolution: Option<String>,
    pub is_ongoing: bool,
    pub progression: Progression,
    pub raw_evidence: String,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileStatus {
    Fetched,
    NotFound,
    TimedOut,
    Failed,
}

/// Enrichment for one top candidate. Placeholder when not `Fetched`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub code: String,
    pub name: String,
    pub status: ProfileStatus,
    pub enrichment: Option<EnrichmentRecord>,
}

impl CandidateProfile {
    pub fn placeholder(candidate: &MatchResult, status: ProfileStatus) -> Self {
        Self {
            code: candidate.code.clone(),
            name: candidate.name.clone(),
            status,
            enrichment: None,
        }
    }
}

/// Immutable snapshot handed to synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPacket {
    pub session_id: Uuid,
    pub assembled_at: DateTime<Utc>,
    pub age: Option<u32>,
    pub sex: Option<Sex>,
    pub family_history: Option<String>,
    pub prior_tests: Vec<PriorTest>,
    pub safety_flags: Vec<SafetyFlag>,
    pub mapped_phenotypes: Vec<MappedPhenotype>,
    pub exclusions: Vec<ExclusionFinding>,
    pub timing: Vec<TimingRecord>,
    pub ranking: Vec<MatchResult>,
    pub refined: bool,
    pub profiles: Vec<CandidateProfile>,
    pub completeness: CompletenessScore,
}

// ═══════════════════════════════════════════════════════════
// Recommendation
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifferentialConfidence {
    High,
    Moderate,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferentialEntry {
    pub disease: String,
    pub disease_id: String,
    pub confidence: DifferentialConfidence,
    #[serde(default)]
    pub confidence_reasoning: String,
    #[serde(default)]
    pub supporting_phenotypes: Vec<String>,
    #[serde(default)]
    pub contradicting_phenotypes: Vec<String>,
    #[serde(default)]
    pub missing_key_phenotypes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    OrderTest,
    RefinePhenotype,
    GeneticTesting,
    Reanalysis,
    ReferSpecialist,
    UrgentEscalation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Urgent,
    Routine,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextStep {
    pub rank: usize,
    pub action_type: ActionType,
    pub action: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub discriminates_between: Vec<String>,
    pub urgency: Urgency,
    #[serde(default)]
    pub evidence_source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UncertaintySummary {
    #[serde(default)]
    pub known: Vec<String>,
    #[serde(default)]
    pub missing: Vec<String>,
    #[serde(default)]
    pub ambiguous: Vec<String>,
}

/// Synthesized (or fallback) recommendation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(default)]
    pub differential: Vec<DifferentialEntry>,
    #[serde(default, alias = "next_best_steps")]
    pub next_steps: Vec<NextStep>,
    #[serde(default)]
    pub what_would_change: Vec<String>,
    #[serde(default)]
    pub uncertainty: UncertaintySummary,
    /// True when built from structured data because synthesis was unusable.
    #[serde(default)]
    pub degraded: bool,
}

// ═══════════════════════════════════════════════════════════
// Pipeline state
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Init,
    SafetyCheck,
    TermMapping,
    InitialRanking,
    TextExtraction,
    RefinedRanking,
    ProfileFetch,
    CompletenessScoring,
    ContextAssembly,
    Synthesis,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 10] = [
        Self::Init,
        Self::SafetyCheck,
        Self::TermMapping,
        Self::InitialRanking,
        Self::TextExtraction,
        Self::RefinedRanking,
        Self::ProfileFetch,
        Self::CompletenessScoring,
        Self::ContextAssembly,
        Self::Synthesis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::SafetyCheck => "safety_check",
            Self::TermMapping => "term_mapping",
            Self::InitialRanking => "initial_ranking",
            Self::TextExtraction => "text_extraction",
            Self::RefinedRanking => "refined_ranking",
            Self::ProfileFetch => "profile_fetch",
            Self::CompletenessScoring => "completeness_scoring",
            Self::ContextAssembly => "context_assembly",
            Self::Synthesis => "synthesis",
        }
    }

    /// The stage that follows, or `None` after `Synthesis`.
    pub fn next(&self) -> Option<PipelineStage> {
        let i = Self::ALL.iter().position(|s| s == self)?;
        Self::ALL.get(i + 1).copied()
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Termination {
    Completed,
    ShortCircuited { reason: String },
    Failed { stage: PipelineStage, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    UnknownCode,
    UnresolvedText,
    Timeout,
    MalformedOutput,
    CollaboratorFailure,
    AuditFailure,
    ObserverFailure,
}

/// A recoverable problem, recorded instead of failing the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineWarning {
    pub stage: PipelineStage,
    pub kind: WarningKind,
    pub detail: String,
}

/// Sent to the progress observer after every stage but `Init`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageUpdate {
    pub stage: PipelineStage,
    pub summary: serde_json::Value,
}

// ═══════════════════════════════════════════════════════════
// Result
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub session_id: Uuid,
    pub termination: Termination,
    pub safety_flags: Vec<SafetyFlag>,
    pub mapped_phenotypes: Vec<MappedPhenotype>,
    pub exclusions: Vec<ExclusionFinding>,
    pub timing: Vec<TimingRecord>,
    pub initial_ranking: Vec<MatchResult>,
    pub ranking: Vec<MatchResult>,
    /// Whether a second, exclusion-aware ranking pass ran.
    pub refined: bool,
    pub profiles: Vec<CandidateProfile>,
    pub completeness: Option<CompletenessScore>,
    pub recommendation: Option<Recommendation>,
    pub stages_completed: Vec<PipelineStage>,
    pub warnings: Vec<PipelineWarning>,
}

impl AnalysisResult {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            termination: Termination::Completed,
            safety_flags: Vec::new(),
            mapped_phenotypes: Vec::new(),
            exclusions: Vec::new(),
            timing: Vec::new(),
            initial_ranking: Vec::new(),
            ranking: Vec::new(),
            refined: false,
            profiles: Vec::new(),
            completeness: None,
            recommendation: None,
            stages_completed: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.termination == Termination::Completed
    }

    pub fn is_short_circuited(&self) -> bool {
        matches!(self.termination, Termination::ShortCircuited { .. })
    }

    /// Codes of every resolved phenotype, first occurrence order.
    pub fn resolved_codes(&self) -> Vec<String> {
        self.mapped_phenotypes
            .iter()
            .filter_map(|m| m.code().map(str::to_string))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn onset_stage_boundaries() {
        assert_eq!(OnsetStage::from_years(0.0), OnsetStage::CongenitalNeonatal);
        assert_eq!(OnsetStage::from_years(-1.0), OnsetStage::CongenitalNeonatal);
        assert_eq!(OnsetStage::from_years(0.33), OnsetStage::Infantile);
        assert_eq!(OnsetStage::from_years(1.0), OnsetStage::Infantile);
        assert_eq!(OnsetStage::from_years(5.0), OnsetStage::Childhood);
        assert_eq!(OnsetStage::from_years(12.0), OnsetStage::Juvenile);
        assert_eq!(OnsetStage::from_years(15.5), OnsetStage::Adult);
    }

    #[test]
    fn onset_stage_wire_name() {
        let json = serde_json::to_string(&OnsetStage::CongenitalNeonatal).unwrap();
        assert_eq!(json, "\"Congenital/Neonatal\"");
    }

    #[test]
    fn stage_sequence() {
        assert_eq!(PipelineStage::Init.next(), Some(PipelineStage::SafetyCheck));
        assert_eq!(
            PipelineStage::CompletenessScoring.next(),
            Some(PipelineStage::ContextAssembly)
        );
        assert_eq!(PipelineStage::Synthesis.next(), None);
        assert_eq!(PipelineStage::RefinedRanking.to_string(), "refined_ranking");
    }

    #[test]
    fn termination_wire_format() {
        let json = serde_json::to_value(Termination::ShortCircuited {
            reason: "urgent".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "short_circuited");
        assert_eq!(json["reason"], "urgent");

        let json = serde_json::to_value(Termination::Failed {
            stage: PipelineStage::ProfileFetch,
            reason: "cancelled".into(),
        })
        .unwrap();
        assert_eq!(json["stage"], "profile_fetch");
    }

    #[test]
    fn query_profile_minimal_json() {
        let profile: QueryProfile =
            serde_json::from_str(r#"{"observed": ["HP:0001250"]}"#).unwrap();
        assert_eq!(profile.observed.len(), 1);
        assert!(profile.text().is_none());
        assert!(!profile.has_prior_tests());
        assert!(!profile.has_family_history());
    }

    #[test]
    fn blank_text_and_history_are_absent() {
        let profile = QueryProfile {
            free_text: Some("   ".into()),
            family_history: Some("\n".into()),
            ..Default::default()
        };
        assert!(profile.text().is_none());
        assert!(!profile.has_family_history());
    }

    #[test]
    fn recommendation_accepts_partial_json() {
        let rec: Recommendation = serde_json::from_str(
            r#"{"next_best_steps": [{"rank": 1, "action_type": "order_test",
                "action": "EEG", "urgency": "routine"}]}"#,
        )
        .unwrap();
        assert_eq!(rec.next_steps.len(), 1);
        assert_eq!(rec.next_steps[0].action_type, ActionType::OrderTest);
        assert!(!rec.degraded);
    }
}
