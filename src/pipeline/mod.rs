pub mod types;
pub mod traits;
pub mod parser;
pub mod text; // Free-text fragment splitting for term mapping
pub mod fallback;
pub mod cancel;
pub mod orchestrator;
pub mod enrichment; // Store-backed profile lookup

pub use cancel::CancellationFlag;
pub use enrichment::StoreEnrichmentLookup;
pub use orchestrator::{Collaborators, DiagnosticPipeline, Transition};
pub use traits::{
    AuditSink, CollaboratorError, EnrichmentLookup, ExclusionExtractor, ProgressObserver,
    SynthesisService, TimingExtractor,
};
pub use types::*;
