use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use phenorank::audit::{JsonlAuditSink, TracingAuditSink};
use phenorank::config::{ConfigError, EngineConfig};
use phenorank::llm::{
    LlmClient, LlmError, LlmExclusionExtractor, LlmSynthesizer, LlmTimingExtractor, OllamaClient,
};
use phenorank::ontology::{JsonSnapshotProvider, OntologyStore, ReferenceDataProvider, StoreError};
use phenorank::pipeline::{
    AuditSink, CancellationFlag, CollaboratorError, Collaborators, ContextPacket, DiagnosticPipeline,
    ExclusionExtractor, QueryProfile, StageUpdate, StoreEnrichmentLookup, SynthesisService,
    Termination, TimingExtractor,
};

/// Grace period for in-flight audit writes after the analysis returns.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "phenorank", version, about = "Rank rare-disease candidates for a phenotype profile")]
struct Cli {
    /// Query profile JSON file, or "-" for stdin.
    query: PathBuf,

    /// Reference snapshot JSON (terms and entities).
    #[arg(long, env = "PHENORANK_REFERENCE_DATA")]
    reference: Option<PathBuf>,

    #[arg(long)]
    ollama_url: Option<String>,

    #[arg(long)]
    model: Option<String>,

    /// Maximum ranked candidates.
    #[arg(long)]
    top_n: Option<usize>,

    #[arg(long, conflicts_with = "trace_audit")]
    audit_log: Option<PathBuf>,

    /// Send audit events to the log instead of a file.
    #[arg(long)]
    trace_audit: bool,

    /// Skip the LLM collaborators; text stages degrade and synthesis falls back.
    #[arg(long)]
    offline: bool,
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Cannot read query {path}: {reason}")]
    Query { path: String, reason: String },

    #[error("Async runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Cannot serialize result: {0}")]
    Output(#[from] serde_json::Error),
}

/// Stand-in for every text collaborator when running offline.
struct Offline;

impl Offline {
    fn unavailable() -> CollaboratorError {
        CollaboratorError::Unavailable("LLM collaborators disabled (--offline)".into())
    }
}

impl ExclusionExtractor for Offline {
    fn extract(&self, _text: &str) -> Result<String, CollaboratorError> {
        Err(Self::unavailable())
    }
}

impl TimingExtractor for Offline {
    fn extract(&self, _text: &str, _labels: &[String]) -> Result<String, CollaboratorError> {
        Err(Self::unavailable())
    }
}

impl SynthesisService for Offline {
    fn synthesize(&self, _packet: &ContextPacket) -> Result<String, CollaboratorError> {
        Err(Self::unavailable())
    }
}

fn main() -> ExitCode {
    phenorank::init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(termination) => match termination {
            Termination::Completed => ExitCode::SUCCESS,
            Termination::ShortCircuited { .. } => ExitCode::from(2),
            Termination::Failed { .. } => ExitCode::FAILURE,
        },
        Err(e) => {
            tracing::error!(error = %e, "Analysis aborted");
            ExitCode::FAILURE
        }
    }
}

fn apply_overrides(cli: &Cli, config: &mut EngineConfig) {
    if let Some(path) = &cli.reference {
        config.reference_data = path.clone();
    }
    if let Some(url) = &cli.ollama_url {
        config.ollama_url = url.clone();
    }
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if let Some(top_n) = cli.top_n.filter(|n| *n > 0) {
        config.pipeline.top_n = top_n;
    }
    if let Some(path) = &cli.audit_log {
        config.audit_log = path.clone();
    }
}

fn read_query(path: &Path) -> Result<QueryProfile, CliError> {
    let query_err = |reason: String| CliError::Query {
        path: path.display().to_string(),
        reason,
    };
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| query_err(e.to_string()))?;
        buf
    } else {
        std::fs::read_to_string(path).map_err(|e| query_err(e.to_string()))?
    };
    serde_json::from_str(&raw).map_err(|e| query_err(e.to_string()))
}

fn collaborators(
    cli: &Cli,
    config: &EngineConfig,
    store: &Arc<OntologyStore>,
) -> Result<Collaborators, CliError> {
    let enrichment = Arc::new(StoreEnrichmentLookup::new(Arc::clone(store)));
    let audit: Arc<dyn AuditSink> = if cli.trace_audit {
        Arc::new(TracingAuditSink)
    } else {
        Arc::new(JsonlAuditSink::new(&config.audit_log))
    };

    if cli.offline {
        let offline = Arc::new(Offline);
        return Ok(Collaborators {
            exclusion: offline.clone(),
            timing: offline.clone(),
            enrichment,
            synthesis: offline,
            audit,
        });
    }

    let timeout_secs = config.pipeline.synthesis_timeout().as_secs().max(1);
    let client: Arc<dyn LlmClient> = Arc::new(OllamaClient::new(&config.ollama_url, timeout_secs)?);
    match client.is_model_available(&config.model) {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(model = %config.model, "Model not installed; synthesis will fall back")
        }
        Err(e) => tracing::warn!(error = %e, "Ollama unreachable; text stages will degrade"),
    }

    Ok(Collaborators {
        exclusion: Arc::new(LlmExclusionExtractor::new(Arc::clone(&client), &config.model)),
        timing: Arc::new(LlmTimingExtractor::new(Arc::clone(&client), &config.model)),
        enrichment,
        synthesis: Arc::new(LlmSynthesizer::new(client, &config.model)),
        audit,
    })
}

/// Blocking setup (store, HTTP client) happens outside the async runtime;
/// only the analysis itself runs inside it.
fn run(cli: Cli) -> Result<Termination, CliError> {
    let mut config = EngineConfig::from_env()?;
    apply_overrides(&cli, &mut config);

    let store = Arc::new(JsonSnapshotProvider::new(&config.reference_data).load()?);
    let profile = read_query(&cli.query)?;
    let pipeline = DiagnosticPipeline::new(
        Arc::clone(&store),
        collaborators(&cli, &config, &store)?,
        config.pipeline.clone(),
    );

    let runtime = tokio::runtime::Runtime::new()?;
    let cancel = CancellationFlag::new();
    let observer = |update: &StageUpdate| {
        tracing::info!(stage = %update.stage, summary = %update.summary, "Stage finished");
    };

    let result = runtime.block_on(async {
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received; stopping after the current stage");
                on_interrupt.cancel();
            }
        });
        pipeline.analyze(profile, Some(&observer), Some(&cancel)).await
    });
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.termination)
}
