//! Minimal recommendation built straight from structured stage outputs, used
//! when synthesis times out, fails, or returns unusable output.

use crate::ontology::MatchConfidence;
use crate::safety::Severity;

use super::types::{
    ActionType, CandidateProfile, ContextPacket, DifferentialConfidence, DifferentialEntry,
    NextStep, ProfileStatus, Recommendation, UncertaintySummary, Urgency,
};

const DIFFERENTIAL_SIZE: usize = 5;
const WHAT_WOULD_CHANGE_LIMIT: usize = 5;

pub fn fallback_recommendation(packet: &ContextPacket) -> Recommendation {
    let differential = packet
        .ranking
        .iter()
        .take(DIFFERENTIAL_SIZE)
        .map(|c| DifferentialEntry {
            disease: c.name.clone(),
            disease_id: c.code.clone(),
            confidence: DifferentialConfidence::Low,
            confidence_reasoning: format!(
                "Phenotype overlap only: similarity {:.2}, {:.0}% of annotated phenotypes observed",
                c.score,
                c.coverage * 100.0
            ),
            supporting_phenotypes: c.matched.clone(),
            contradicting_phenotypes: Vec::new(),
            missing_key_phenotypes: c.missing.clone(),
        })
        .collect();

    let mut steps: Vec<NextStep> = Vec::new();
    let mut push = |action_type: ActionType,
                    action: String,
                    rationale: String,
                    between: Vec<String>,
                    urgency: Urgency,
                    source: &str| {
        steps.push(NextStep {
            rank: steps.len() + 1,
            action_type,
            action,
            rationale,
            discriminates_between: between,
            urgency,
            evidence_source: source.to_string(),
        });
    };

    for flag in packet
        .safety_flags
        .iter()
        .filter(|f| f.severity == Severity::Warning)
    {
        push(
            ActionType::UrgentEscalation,
            flag.recommended_action.clone(),
            format!("Red flag: {}", flag.label),
            Vec::new(),
            Urgency::Urgent,
            flag.rule_id.as_str(),
        );
    }

    let top_codes: Vec<String> = packet.ranking.iter().take(3).map(|c| c.code.clone()).collect();
    push(
        ActionType::RefinePhenotype,
        "Review and refine the phenotype description".to_string(),
        "Automated synthesis unavailable; ranking reflects phenotype overlap only".to_string(),
        top_codes,
        Urgency::Routine,
        "similarity ranking",
    );

    if let Some(profile) = fetched(&packet.profiles).find(|p| {
        p.enrichment
            .as_ref()
            .is_some_and(|e| !e.recommended_tests.is_empty())
    }) {
        let tests = profile
            .enrichment
            .as_ref()
            .map(|e| e.recommended_tests.join(", "))
            .unwrap_or_default();
        push(
            ActionType::OrderTest,
            format!("Consider: {tests}"),
            format!("Recommended for {}", profile.name),
            vec![profile.code.clone()],
            Urgency::Routine,
            "reference enrichment",
        );
    }

    if packet.prior_tests.is_empty() {
        let top = packet.ranking.first().and_then(|c| {
            fetched(&packet.profiles).find(|p| p.code == c.code)
        });
        if let Some((profile, genes)) = top.and_then(|p| {
            p.enrichment
                .as_ref()
                .filter(|e| !e.genes.is_empty())
                .map(|e| (p, e.genes.join(", ")))
        }) {
            push(
                ActionType::GeneticTesting,
                format!("Genetic testing including {genes}"),
                format!("No prior testing; {} has known causal genes", profile.name),
                vec![profile.code.clone()],
                Urgency::Routine,
                "reference enrichment",
            );
        }
    }

    Recommendation {
        differential,
        next_steps: steps,
        what_would_change: what_would_change(packet),
        uncertainty: uncertainty(packet),
        degraded: true,
    }
}

fn fetched(profiles: &[CandidateProfile]) -> impl Iterator<Item = &CandidateProfile> {
    profiles
        .iter()
        .filter(|p| p.status == ProfileStatus::Fetched)
}

fn what_would_change(packet: &ContextPacket) -> Vec<String> {
    packet
        .ranking
        .first()
        .map(|top| {
            top.missing
                .iter()
                .take(WHAT_WOULD_CHANGE_LIMIT)
                .map(|code| format!("Confirming or excluding {code} ({})", top.name))
                .collect()
        })
        .unwrap_or_default()
}

fn uncertainty(packet: &ContextPacket) -> UncertaintySummary {
    let mut known = Vec::new();
    let mut ambiguous = Vec::new();
    for mapped in &packet.mapped_phenotypes {
        match &mapped.term {
            Some(term) if term.confidence == MatchConfidence::High => known.push(term.label.clone()),
            Some(term) => ambiguous.push(format!("{} (matched to {})", mapped.input, term.label)),
            None => ambiguous.push(format!("{} (unmapped)", mapped.input)),
        }
    }

    let c = &packet.completeness;
    let mut missing = Vec::new();
    if c.timing_coverage < 1.0 {
        missing.push("onset and timing information".to_string());
    }
    if c.exclusion == 0.0 {
        missing.push("explicitly excluded phenotypes".to_string());
    }
    if c.prior_tests == 0.0 {
        missing.push("prior test results".to_string());
    }
    if c.family_history == 0.0 {
        missing.push("family history".to_string());
    }

    UncertaintySummary {
        known,
        missing,
        ambiguous,
    }
}
