//! Local LLM access for the text collaborators (exclusion extraction, timing
//! extraction, synthesis).

pub mod ollama;
pub mod prompts;
pub mod collaborators;

pub use collaborators::{LlmExclusionExtractor, LlmSynthesizer, LlmTimingExtractor};
pub use ollama::{MockLlmClient, OllamaClient};

use thiserror::Error;

use crate::pipeline::CollaboratorError;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Cannot connect to Ollama at {0}")]
    Connection(String),

    #[error("Ollama returned error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Failed to parse Ollama response: {0}")]
    ResponseParsing(String),
}

impl From<LlmError> for CollaboratorError {
    fn from(err: LlmError) -> Self {
        let message = err.to_string();
        match err {
            LlmError::Connection(_) => CollaboratorError::Unavailable(message),
            _ => CollaboratorError::Failed(message),
        }
    }
}

/// Text generation backend.
pub trait LlmClient: Send + Sync {
    /// Single non-streaming completion.
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, LlmError>;

    /// Names of locally available models.
    fn list_models(&self) -> Result<Vec<String>, LlmError>;

    fn is_model_available(&self, model: &str) -> Result<bool, LlmError> {
        Ok(self.list_models()?.iter().any(|m| m.starts_with(model)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_maps_to_unavailable() {
        let err: CollaboratorError = LlmError::Connection("http://localhost:11434".into()).into();
        assert!(matches!(err, CollaboratorError::Unavailable(_)));
    }

    #[test]
    fn other_errors_map_to_failed() {
        let err: CollaboratorError = LlmError::Http {
            status: 500,
            body: "model not loaded".into(),
        }
        .into();
        match err {
            CollaboratorError::Failed(msg) => assert!(msg.contains("500")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
