pub mod audit;
pub mod completeness;
pub mod config;
pub mod llm; // Ollama-backed text collaborators
pub mod ontology;
pub mod pipeline;
pub mod pipeline_config;
pub mod ranking;
pub mod safety; // Deterministic red-flag gate

pub use ontology::{OntologyStore, StoreError};
pub use pipeline::{AnalysisResult, DiagnosticPipeline, QueryProfile};
pub use pipeline_config::PipelineConfig;

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Logs go to stderr so stdout stays clean for
/// results; `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
}
