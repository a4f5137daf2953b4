//! Collaborator contracts.
//!
//! All collaborators are synchronous and `Send + Sync`; the pipeline moves
//! each call onto the blocking pool and bounds it with its own timeout.
//! Extractors and synthesis return raw model output, parsed defensively by
//! the pipeline.

use thiserror::Error;

use crate::audit::{AuditError, AuditEvent};
use crate::ontology::EnrichmentRecord;

use super::types::{ContextPacket, StageUpdate};

#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Collaborator call failed: {0}")]
    Failed(String),
}

/// Finds negated findings in clinical free text.
pub trait ExclusionExtractor: Send + Sync {
    /// Raw output expected to hold a JSON array of
    /// `{raw_text, finding, exclusion_type, confidence}`.
    fn extract(&self, text: &str) -> Result<String, CollaboratorError>;
}

/// Finds onset and course for already-identified phenotypes.
pub trait TimingExtractor: Send + Sync {
    /// Raw output expected to hold a JSON array of timing objects.
    fn extract(&self, text: &str, known_labels: &[String]) -> Result<String, CollaboratorError>;
}

/// Enrichment for a reference entity. Pure and fast; may be absent.
pub trait EnrichmentLookup: Send + Sync {
    fn fetch(&self, reference_code: &str) -> Option<EnrichmentRecord>;
}

/// Produces the final recommendation from the context packet.
pub trait SynthesisService: Send + Sync {
    /// Raw output expected to hold a recommendation JSON object.
    fn synthesize(&self, packet: &ContextPacket) -> Result<String, CollaboratorError>;
}

/// Session record sink. Failures are logged by the caller, never propagated.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Best-effort progress callback.
pub trait ProgressObserver: Send + Sync {
    fn on_stage(&self, update: &StageUpdate);
}

impl<F> ProgressObserver for F
where
    F: Fn(&StageUpdate) + Send + Sync,
{
    fn on_stage(&self, update: &StageUpdate) {
        self(update)
    }
}
