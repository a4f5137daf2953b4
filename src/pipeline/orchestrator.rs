//! Diagnostic pipeline: an explicit ten-stage state machine.
//!
//! Init → SafetyCheck → TermMapping → InitialRanking → TextExtraction →
//! RefinedRanking → ProfileFetch → CompletenessScoring → ContextAssembly →
//! Synthesis.
//!
//! Each stage returns a [`Transition`]; early exit (urgent red flag) and
//! cancellation are terminal transitions, never ad hoc returns. External
//! calls run on the blocking pool under their own timeouts and degrade to
//! empty or placeholder output on failure. Only a corrupt store is fatal, and
//! that is caught before a pipeline can exist.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde_json::json;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditEventKind};
use crate::completeness::{self, CompletenessSignals};
use crate::ontology::{OntologyStore, TermResolver};
use crate::pipeline_config::PipelineConfig;
use crate::ranking::SimilarityRanker;
use crate::safety::{highest_severity, SafetyGate, Severity};

use super::cancel::CancellationFlag;
use super::fallback::fallback_recommendation;
use super::parser::{parse_exclusions, parse_recommendation, parse_timing};
use super::text::{is_negated, split_fragments};
use super::traits::{
    AuditSink, CollaboratorError, EnrichmentLookup, ExclusionExtractor, ProgressObserver,
    SynthesisService, TimingExtractor,
};
use super::types::*;

/// Reason attached to a short-circuited run.
pub const URGENT_REASON: &str = "urgent";
/// Reason attached to a cancelled run.
pub const CANCELLED_REASON: &str = "cancelled";

/// External collaborators of one pipeline.
#[derive(Clone)]
pub struct Collaborators {
    pub exclusion: Arc<dyn ExclusionExtractor>,
    pub timing: Arc<dyn TimingExtractor>,
    pub enrichment: Arc<dyn EnrichmentLookup>,
    pub synthesis: Arc<dyn SynthesisService>,
    pub audit: Arc<dyn AuditSink>,
}

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Next(PipelineStage),
    Terminate(Termination),
}

impl Transition {
    /// Proceed to the stage after `stage`, or complete after the last one.
    fn after(stage: PipelineStage) -> Self {
        match stage.next() {
            Some(next) => Self::Next(next),
            None => Self::Terminate(Termination::Completed),
        }
    }
}

/// Why an external call produced nothing usable.
#[derive(Debug)]
enum CallError {
    Timeout(Duration),
    Failed(CollaboratorError),
    Panicked(String),
}

impl CallError {
    fn kind(&self) -> WarningKind {
        match self {
            Self::Timeout(_) => WarningKind::Timeout,
            Self::Failed(_) | Self::Panicked(_) => WarningKind::CollaboratorFailure,
        }
    }

    fn detail(&self, what: &str) -> String {
        match self {
            Self::Timeout(limit) => format!("{what} timed out after {} ms", limit.as_millis()),
            Self::Failed(e) => format!("{what} failed: {e}"),
            Self::Panicked(e) => format!("{what} panicked: {e}"),
        }
    }
}

/// Run `f` on the blocking pool, bounded by `limit`. On timeout the worker is
/// left to finish in the background; its result is discarded.
async fn call_blocking<T, F>(limit: Duration, f: F) -> Result<T, CallError>
where
    F: FnOnce() -> Result<T, CollaboratorError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(f)).await {
        Err(_) => Err(CallError::Timeout(limit)),
        Ok(Err(join)) => Err(CallError::Panicked(join.to_string())),
        Ok(Ok(Err(e))) => Err(CallError::Failed(e)),
        Ok(Ok(Ok(value))) => Ok(value),
    }
}

/// Request-scoped state threaded through the stages.
struct Run {
    profile: QueryProfile,
    result: AnalysisResult,
    text_extraction_ran: bool,
    packet: Option<ContextPacket>,
    audit_tasks: Vec<(&'static str, JoinHandle<Result<(), String>>)>,
}

impl Run {
    /// Structured exclusions plus mapped extracted ones, first-seen order.
    fn excluded_codes(&self) -> Vec<String> {
        let mut excluded: Vec<String> = Vec::new();
        let extracted = self.result.exclusions.iter().filter_map(|e| e.mapped_code.clone());
        for code in self.profile.excluded.iter().cloned().chain(extracted) {
            if !excluded.contains(&code) {
                excluded.push(code);
            }
        }
        excluded
    }

    /// Resolved codes minus anything stated as absent.
    fn observed_codes(&self) -> Vec<String> {
        let excluded = self.excluded_codes();
        self.result
            .resolved_codes()
            .into_iter()
            .filter(|code| !excluded.contains(code))
            .collect()
    }

    fn warn(&mut self, stage: PipelineStage, kind: WarningKind, detail: String) {
        tracing::warn!(
            session_id = %self.result.session_id,
            stage = %stage,
            kind = ?kind,
            "Pipeline degraded"
        );
        self.result.warnings.push(PipelineWarning {
            stage,
            kind,
            detail,
        });
    }
}

pub struct DiagnosticPipeline {
    store: Arc<OntologyStore>,
    gate: SafetyGate,
    resolver: TermResolver,
    ranker: SimilarityRanker,
    collaborators: Collaborators,
    config: PipelineConfig,
}

impl DiagnosticPipeline {
    pub fn new(store: Arc<OntologyStore>, collaborators: Collaborators, config: PipelineConfig) -> Self {
        Self {
            gate: SafetyGate::new(Arc::clone(&store)),
            resolver: TermResolver::new(Arc::clone(&store), config.resolver.clone()),
            ranker: SimilarityRanker::new(Arc::clone(&store), config.top_n),
            store,
            collaborators,
            config,
        }
    }

    pub fn store(&self) -> &Arc<OntologyStore> {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyze one query profile. Never fails: recoverable problems are
    /// recorded as warnings on the result.
    pub async fn analyze(
        &self,
        profile: QueryProfile,
        observer: Option<&dyn ProgressObserver>,
        cancel: Option<&CancellationFlag>,
    ) -> AnalysisResult {
        let started = Instant::now();
        let mut run = Run {
            profile,
            result: AnalysisResult::new(Uuid::new_v4()),
            text_extraction_ran: false,
            packet: None,
            audit_tasks: Vec::new(),
        };

        let mut stage = PipelineStage::Init;
        let termination = loop {
            if cancel.is_some_and(CancellationFlag::is_cancelled) {
                tracing::info!(session_id = %run.result.session_id, stage = %stage, "Analysis cancelled");
                break Termination::Failed {
                    stage,
                    reason: CANCELLED_REASON.to_string(),
                };
            }

            let stage_started = Instant::now();
            let transition = self.step(stage, &mut run).await;
            let duration_ms = stage_started.elapsed().as_millis() as u64;
            run.result.stages_completed.push(stage);
            tracing::debug!(
                session_id = %run.result.session_id,
                stage = %stage,
                duration_ms,
                "Stage complete"
            );
            self.audit(&mut run, AuditEventKind::StageCompleted { stage, duration_ms });

            if stage != PipelineStage::Init {
                if let Some(observer) = observer {
                    notify(observer, stage, &mut run);
                }
            }

            match transition {
                Transition::Next(next) => stage = next,
                Transition::Terminate(termination) => break termination,
            }
        };

        self.collect_audit_failures(&mut run).await;
        run.result.termination = termination;

        tracing::info!(
            session_id = %run.result.session_id,
            termination = ?run.result.termination,
            stages = run.result.stages_completed.len(),
            warnings = run.result.warnings.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analysis finished"
        );
        let finished = AuditEventKind::AnalysisFinished {
            termination: run.result.termination.clone(),
            stages_completed: run.result.stages_completed.len(),
            warnings: run.result.warnings.len(),
        };
        self.audit(&mut run, finished);

        run.result
    }

    async fn step(&self, stage: PipelineStage, run: &mut Run) -> Transition {
        match stage {
            PipelineStage::Init => self.init(run),
            PipelineStage::SafetyCheck => self.safety_check(run),
            PipelineStage::TermMapping => self.map_terms(run),
            PipelineStage::InitialRanking => self.initial_ranking(run),
            PipelineStage::TextExtraction => self.extract_text(run).await,
            PipelineStage::RefinedRanking => self.refined_ranking(run),
            PipelineStage::ProfileFetch => self.fetch_profiles(run).await,
            PipelineStage::CompletenessScoring => self.score_completeness(run),
            PipelineStage::ContextAssembly => self.assemble_context(run),
            PipelineStage::Synthesis => self.synthesize(run).await,
        }
    }

    // ── 1. Init ────────────────────────────────────────────

    fn init(&self, run: &mut Run) -> Transition {
        tracing::info!(
            session_id = %run.result.session_id,
            observed = run.profile.observed.len(),
            excluded = run.profile.excluded.len(),
            has_free_text = run.profile.text().is_some(),
            "Analysis started"
        );
        let opened = AuditEventKind::SessionOpened {
            observed: run.profile.observed.len(),
            excluded: run.profile.excluded.len(),
            has_free_text: run.profile.text().is_some(),
        };
        self.audit(run, opened);
        Transition::after(PipelineStage::Init)
    }

    // ── 2. SafetyCheck ─────────────────────────────────────

    /// Structured items only: codes as given, labels through exact lookup.
    fn safety_check(&self, run: &mut Run) -> Transition {
        let stage = PipelineStage::SafetyCheck;
        let codes: Vec<String> = run
            .profile
            .observed
            .iter()
            .filter_map(|item| {
                if self.resolver.is_code(item) {
                    Some(item.trim().to_string())
                } else {
                    self.store
                        .lookup_label(item)
                        .map(|id| self.store.term(id).code.clone())
                }
            })
            .collect();

        let report = self.gate.evaluate(&codes);
        for code in &report.unknown_codes {
            run.warn(stage, WarningKind::UnknownCode, format!("Unknown code {code} skipped by safety gate"));
        }
        let urgent = report.is_urgent();
        run.result.safety_flags = report.flags;

        if urgent {
            tracing::warn!(
                session_id = %run.result.session_id,
                flags = run.result.safety_flags.len(),
                "Urgent red flag; short-circuiting analysis"
            );
            return Transition::Terminate(Termination::ShortCircuited {
                reason: URGENT_REASON.to_string(),
            });
        }
        Transition::after(stage)
    }

    // ── 3. TermMapping ─────────────────────────────────────

    fn map_terms(&self, run: &mut Run) -> Transition {
        let stage = PipelineStage::TermMapping;

        let mut inputs: Vec<(String, PhenotypeSource)> = run
            .profile
            .observed
            .iter()
            .map(|item| (item.clone(), PhenotypeSource::Structured))
            .collect();
        let mut negated = 0usize;
        if let Some(text) = run.profile.text() {
            for fragment in split_fragments(text) {
                if is_negated(&fragment) {
                    negated += 1;
                } else {
                    inputs.push((fragment, PhenotypeSource::FreeText));
                }
            }
        }

        let mut seen_codes = std::collections::HashSet::new();
        let mut mapped = Vec::with_capacity(inputs.len());
        for (input, source) in inputs {
            match self.resolver.resolve(&input) {
                Some(term) => {
                    if seen_codes.insert(term.code.clone()) {
                        mapped.push(MappedPhenotype {
                            input,
                            source,
                            term: Some(term),
                        });
                    }
                }
                None => {
                    let kind = if self.resolver.is_code(&input) {
                        WarningKind::UnknownCode
                    } else {
                        WarningKind::UnresolvedText
                    };
                    run.warn(stage, kind, format!("Unresolved phenotype input: {input}"));
                    mapped.push(MappedPhenotype {
                        input,
                        source,
                        term: None,
                    });
                }
            }
        }

        tracing::info!(
            session_id = %run.result.session_id,
            resolved = seen_codes.len(),
            unmapped = mapped.iter().filter(|m| !m.is_mapped()).count(),
            negated,
            "Term mapping complete"
        );
        run.result.mapped_phenotypes = mapped;
        Transition::after(stage)
    }

    // ── 4. InitialRanking ──────────────────────────────────

    fn initial_ranking(&self, run: &mut Run) -> Transition {
        let outcome = self.ranker.rank_observed(&run.observed_codes());
        run.result.initial_ranking = outcome.results;
        Transition::after(PipelineStage::InitialRanking)
    }

    // ── 5. TextExtraction ──────────────────────────────────

    async fn extract_text(&self, run: &mut Run) -> Transition {
        let stage = PipelineStage::TextExtraction;
        let Some(text) = run.profile.text().map(str::to_string) else {
            return Transition::after(stage);
        };
        run.text_extraction_ran = true;

        let labels: Vec<String> = run
            .result
            .mapped_phenotypes
            .iter()
            .filter_map(|m| m.term.as_ref().map(|t| t.label.clone()))
            .collect();
        let limit = self.config.extraction_timeout();

        let exclusion_call = {
            let extractor = Arc::clone(&self.collaborators.exclusion);
            let text = text.clone();
            call_blocking(limit, move || extractor.extract(&text))
        };
        // Timing anchors on known labels; nothing to anchor on, nothing to ask.
        let timing_call = async {
            if labels.is_empty() {
                return None;
            }
            let extractor = Arc::clone(&self.collaborators.timing);
            let text = text.clone();
            Some(call_blocking(limit, move || extractor.extract(&text, &labels)).await)
        };

        let (exclusion_raw, timing_raw) = tokio::join!(exclusion_call, timing_call);

        match exclusion_raw {
            Ok(raw) => match parse_exclusions(&raw) {
                Ok(items) => {
                    let cutoff = self.config.exclusion_match_cutoff;
                    run.result.exclusions = items
                        .into_iter()
                        .map(|item| {
                            let mapped = self.resolver.resolve_with_cutoff(&item.finding, cutoff);
                            ExclusionFinding {
                                raw_text: item.raw_text,
                                finding: item.finding,
                                exclusion_type: item.exclusion_type,
                                confidence: item.confidence,
                                mapped_code: mapped.as_ref().map(|t| t.code.clone()),
                                mapped_label: mapped.map(|t| t.label),
                            }
                        })
                        .collect();
                }
                Err(e) => run.warn(
                    stage,
                    WarningKind::MalformedOutput,
                    format!("Exclusion extractor output unusable: {e}"),
                ),
            },
            Err(e) => run.warn(stage, e.kind(), e.detail("Exclusion extraction")),
        }

        match timing_raw {
            None => {}
            Some(Ok(raw)) => match parse_timing(&raw) {
                Ok(records) => run.result.timing = records,
                Err(e) => run.warn(
                    stage,
                    WarningKind::MalformedOutput,
                    format!("Timing extractor output unusable: {e}"),
                ),
            },
            Some(Err(e)) => run.warn(stage, e.kind(), e.detail("Timing extraction")),
        }

        tracing::info!(
            session_id = %run.result.session_id,
            exclusions = run.result.exclusions.len(),
            timing = run.result.timing.len(),
            "Text extraction complete"
        );
        Transition::after(stage)
    }

    // ── 6. RefinedRanking ──────────────────────────────────

    fn refined_ranking(&self, run: &mut Run) -> Transition {
        let stage = PipelineStage::RefinedRanking;

        let excluded = run.excluded_codes();
        if excluded.is_empty() {
            run.result.ranking = run.result.initial_ranking.clone();
            run.result.refined = false;
            return Transition::after(stage);
        }

        let outcome = self.ranker.rank(&run.observed_codes(), &excluded);
        for code in &outcome.unknown_codes {
            run.warn(stage, WarningKind::UnknownCode, format!("Unknown excluded code {code} skipped"));
        }
        run.result.ranking = outcome.results;
        run.result.refined = true;
        Transition::after(stage)
    }

    // ── 7. ProfileFetch ────────────────────────────────────

    async fn fetch_profiles(&self, run: &mut Run) -> Transition {
        let stage = PipelineStage::ProfileFetch;
        let limit = self.config.profile_timeout();
        let candidates: Vec<_> = run
            .result
            .ranking
            .iter()
            .take(self.config.profile_fetch_count)
            .cloned()
            .collect();

        let calls = candidates.iter().map(|candidate| {
            let lookup = Arc::clone(&self.collaborators.enrichment);
            let code = candidate.code.clone();
            call_blocking(limit, move || Ok(lookup.fetch(&code)))
        });
        let outcomes = join_all(calls).await;

        let mut profiles = Vec::with_capacity(candidates.len());
        for (candidate, outcome) in candidates.iter().zip(outcomes) {
            let profile = match outcome {
                Ok(Some(enrichment)) => CandidateProfile {
                    code: candidate.code.clone(),
                    name: candidate.name.clone(),
                    status: ProfileStatus::Fetched,
                    enrichment: Some(enrichment),
                },
                Ok(None) => CandidateProfile::placeholder(candidate, ProfileStatus::NotFound),
                Err(e) => {
                    let status = match e {
                        CallError::Timeout(_) => ProfileStatus::TimedOut,
                        _ => ProfileStatus::Failed,
                    };
                    run.warn(stage, e.kind(), e.detail(&format!("Profile fetch for {}", candidate.code)));
                    CandidateProfile::placeholder(candidate, status)
                }
            };
            profiles.push(profile);
        }

        run.result.profiles = profiles;
        Transition::after(stage)
    }

    // ── 8. CompletenessScoring ─────────────────────────────

    fn score_completeness(&self, run: &mut Run) -> Transition {
        let excluded = run.excluded_codes();
        let resolved: Vec<_> = run
            .result
            .mapped_phenotypes
            .iter()
            .filter_map(|m| m.term.as_ref())
            .filter(|term| !excluded.contains(&term.code))
            .collect();
        let timed_terms = resolved
            .iter()
            .filter(|term| {
                run.result.timing.iter().any(|t| {
                    let r = t.phenotype_ref.trim();
                    r.eq_ignore_ascii_case(&term.code) || r.eq_ignore_ascii_case(&term.label)
                })
            })
            .count();

        let signals = CompletenessSignals {
            resolved_terms: resolved.len(),
            timed_terms,
            has_exclusion: !run.result.exclusions.is_empty() || !run.profile.excluded.is_empty(),
            has_prior_tests: run.profile.has_prior_tests(),
            has_family_history: run.profile.has_family_history(),
        };
        run.result.completeness = Some(completeness::score(&signals));
        Transition::after(PipelineStage::CompletenessScoring)
    }

    // ── 9. ContextAssembly ─────────────────────────────────

    fn assemble_context(&self, run: &mut Run) -> Transition {
        let r = &run.result;
        let packet = ContextPacket {
            session_id: r.session_id,
            assembled_at: chrono::Utc::now(),
            age: run.profile.age,
            sex: run.profile.sex,
            family_history: run.profile.family_history.clone(),
            prior_tests: run.profile.prior_tests.clone(),
            safety_flags: r.safety_flags.clone(),
            mapped_phenotypes: r.mapped_phenotypes.clone(),
            exclusions: r.exclusions.clone(),
            timing: r.timing.clone(),
            ranking: r.ranking.clone(),
            refined: r.refined,
            profiles: r.profiles.clone(),
            completeness: r.completeness.clone().unwrap_or_default(),
        };
        self.audit(
            run,
            AuditEventKind::ContextAssembled {
                packet: Box::new(packet.clone()),
            },
        );
        run.packet = Some(packet);
        Transition::after(PipelineStage::ContextAssembly)
    }

    // ── 10. Synthesis ──────────────────────────────────────

    async fn synthesize(&self, run: &mut Run) -> Transition {
        let stage = PipelineStage::Synthesis;
        let Some(packet) = run.packet.clone() else {
            return Transition::Terminate(Termination::Failed {
                stage,
                reason: "context packet missing".to_string(),
            });
        };

        let service = Arc::clone(&self.collaborators.synthesis);
        let call_packet = packet.clone();
        let outcome =
            call_blocking(self.config.synthesis_timeout(), move || service.synthesize(&call_packet))
                .await;

        let recommendation = match outcome {
            Ok(raw) => match parse_recommendation(&raw) {
                Ok(recommendation) => Some(recommendation),
                Err(e) => {
                    run.warn(stage, WarningKind::MalformedOutput, format!("Synthesis output unusable: {e}"));
                    None
                }
            },
            Err(e) => {
                run.warn(stage, e.kind(), e.detail("Synthesis"));
                None
            }
        };

        let recommendation = recommendation.unwrap_or_else(|| {
            tracing::info!(session_id = %run.result.session_id, "Using fallback recommendation");
            fallback_recommendation(&packet)
        });
        run.result.recommendation = Some(recommendation);
        Transition::after(stage)
    }

    // ── Audit ──────────────────────────────────────────────

    /// Dispatch on the blocking pool without waiting.
    fn audit(&self, run: &mut Run, kind: AuditEventKind) {
        let event = AuditEvent::new(run.result.session_id, kind);
        let name = event.name();
        let sink = Arc::clone(&self.collaborators.audit);
        let handle = tokio::task::spawn_blocking(move || {
            sink.record(&event).map_err(|e| {
                tracing::warn!(error = %e, event = event.name(), "Audit sink failed");
                e.to_string()
            })
        });
        run.audit_tasks.push((name, handle));
    }

    /// Record failures of audit calls that have already finished. Calls still
    /// in flight are left alone.
    async fn collect_audit_failures(&self, run: &mut Run) {
        let tasks = std::mem::take(&mut run.audit_tasks);
        for (name, handle) in tasks {
            if !handle.is_finished() {
                continue;
            }
            let detail = match handle.await {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("Audit event {name} not recorded: {e}"),
                Err(e) => format!("Audit event {name} panicked: {e}"),
            };
            run.result.warnings.push(PipelineWarning {
                stage: PipelineStage::Init,
                kind: WarningKind::AuditFailure,
                detail,
            });
        }
    }
}

/// Invoke the observer; a panic inside it becomes a warning.
fn notify(observer: &dyn ProgressObserver, stage: PipelineStage, run: &mut Run) {
    let update = StageUpdate {
        stage,
        summary: summarize(stage, run),
    };
    if catch_unwind(AssertUnwindSafe(|| observer.on_stage(&update))).is_err() {
        run.warn(stage, WarningKind::ObserverFailure, "Progress observer panicked".to_string());
    }
}

fn summarize(stage: PipelineStage, run: &Run) -> serde_json::Value {
    let r = &run.result;
    let top = |ranking: &[crate::ranking::MatchResult]| ranking.first().map(|m| m.code.clone());
    match stage {
        PipelineStage::Init => json!({ "session_id": r.session_id }),
        PipelineStage::SafetyCheck => json!({
            "flags": r.safety_flags.len(),
            "highest_severity": highest_severity(&r.safety_flags),
            "rule_ids": r.safety_flags.iter().map(|f| f.rule_id.as_str()).collect::<Vec<_>>(),
            "warnings": r.safety_flags.iter().filter(|f| f.severity == Severity::Warning).count(),
        }),
        PipelineStage::TermMapping => json!({
            "mapped": r.mapped_phenotypes.iter().filter(|m| m.is_mapped()).count(),
            "unmapped": r.mapped_phenotypes.iter().filter(|m| !m.is_mapped()).count(),
        }),
        PipelineStage::InitialRanking => json!({
            "candidates": r.initial_ranking.len(),
            "top": top(&r.initial_ranking),
        }),
        PipelineStage::TextExtraction => json!({
            "skipped": !run.text_extraction_ran,
            "exclusions": r.exclusions.len(),
            "timing": r.timing.len(),
        }),
        PipelineStage::RefinedRanking => json!({
            "refined": r.refined,
            "candidates": r.ranking.len(),
            "top": top(&r.ranking),
        }),
        PipelineStage::ProfileFetch => json!({
            "requested": r.profiles.len(),
            "fetched": r.profiles.iter().filter(|p| p.status == ProfileStatus::Fetched).count(),
        }),
        PipelineStage::CompletenessScoring => json!({
            "score": r.completeness.as_ref().map(|c| c.score),
        }),
        PipelineStage::ContextAssembly => json!({
            "assembled": run.packet.is_some(),
        }),
        PipelineStage::Synthesis => json!({
            "degraded": r.recommendation.as_ref().map(|rec| rec.degraded),
            "differential": r.recommendation.as_ref().map_or(0, |rec| rec.differential.len()),
        }),
    }
}
