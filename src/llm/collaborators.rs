//! LLM-backed implementations of the pipeline's text collaborators. Each one
//! returns raw model output; parsing and degradation belong to the pipeline.

use std::sync::Arc;

use crate::pipeline::{
    CollaboratorError, ContextPacket, ExclusionExtractor, SynthesisService, TimingExtractor,
};

use super::prompts;
use super::LlmClient;

pub struct LlmExclusionExtractor {
    client: Arc<dyn LlmClient>,
    model: String,
}

impl LlmExclusionExtractor {
    pub fn new(client: Arc<dyn LlmClient>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

impl ExclusionExtractor for LlmExclusionExtractor {
    fn extract(&self, text: &str) -> Result<String, CollaboratorError> {
        let prompt = prompts::build_note_prompt(text);
        Ok(self
            .client
            .generate(&self.model, &prompt, prompts::EXCLUSION_SYSTEM_PROMPT)?)
    }
}

pub struct LlmTimingExtractor {
    client: Arc<dyn LlmClient>,
    model: String,
}

impl LlmTimingExtractor {
    pub fn new(client: Arc<dyn LlmClient>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

impl TimingExtractor for LlmTimingExtractor {
    fn extract(&self, text: &str, known_labels: &[String]) -> Result<String, CollaboratorError> {
        let prompt = prompts::build_note_prompt(text);
        let system = prompts::build_timing_system(known_labels);
        Ok(self.client.generate(&self.model, &prompt, &system)?)
    }
}

pub struct LlmSynthesizer {
    client: Arc<dyn LlmClient>,
    model: String,
}

impl LlmSynthesizer {
    pub fn new(client: Arc<dyn LlmClient>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

impl SynthesisService for LlmSynthesizer {
    fn synthesize(&self, packet: &ContextPacket) -> Result<String, CollaboratorError> {
        let prompt = prompts::build_synthesis_prompt(packet)
            .map_err(|e| CollaboratorError::Failed(format!("Context serialization: {e}")))?;
        Ok(self
            .client
            .generate(&self.model, &prompt, prompts::SYNTHESIS_SYSTEM_PROMPT)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient};
    use std::sync::Mutex;

    /// Records the last (model, prompt, system) triple.
    #[derive(Default)]
    struct RecordingLlm {
        last: Mutex<Option<(String, String, String)>>,
    }

    impl LlmClient for RecordingLlm {
        fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, LlmError> {
            *self.last.lock().unwrap() = Some((model.into(), prompt.into(), system.into()));
            Ok("[]".into())
        }

        fn list_models(&self) -> Result<Vec<String>, LlmError> {
            Ok(vec![])
        }
    }

    struct OfflineLlm;

    impl LlmClient for OfflineLlm {
        fn generate(&self, _: &str, _: &str, _: &str) -> Result<String, LlmError> {
            Err(LlmError::Connection("http://localhost:11434".into()))
        }

        fn list_models(&self) -> Result<Vec<String>, LlmError> {
            Err(LlmError::Connection("http://localhost:11434".into()))
        }
    }

    #[test]
    fn exclusion_extractor_passes_note_and_model() {
        let llm = Arc::new(RecordingLlm::default());
        let extractor = LlmExclusionExtractor::new(llm.clone(), "medgemma:4b");
        assert_eq!(extractor.extract("No seizures.").unwrap(), "[]");

        let (model, prompt, system) = llm.last.lock().unwrap().clone().unwrap();
        assert_eq!(model, "medgemma:4b");
        assert!(prompt.contains("No seizures."));
        assert_eq!(system, prompts::EXCLUSION_SYSTEM_PROMPT);
    }

    #[test]
    fn timing_extractor_anchors_on_labels() {
        let llm = Arc::new(RecordingLlm::default());
        let extractor = LlmTimingExtractor::new(llm.clone(), "medgemma:4b");
        extractor
            .extract("Seizures since 4 months.", &["Seizure".into()])
            .unwrap();
        let (_, _, system) = llm.last.lock().unwrap().clone().unwrap();
        assert!(system.contains("- Seizure"));
    }

    #[test]
    fn synthesizer_returns_raw_output() {
        let llm = Arc::new(MockLlmClient::new(r#"{"differential": []}"#));
        let synth = LlmSynthesizer::new(llm, "medgemma:4b");
        let packet = ContextPacket {
            session_id: uuid::Uuid::nil(),
            assembled_at: chrono::Utc::now(),
            age: None,
            sex: None,
            family_history: None,
            prior_tests: vec![],
            safety_flags: vec![],
            mapped_phenotypes: vec![],
            exclusions: vec![],
            timing: vec![],
            ranking: vec![],
            refined: false,
            profiles: vec![],
            completeness: Default::default(),
        };
        assert_eq!(synth.synthesize(&packet).unwrap(), r#"{"differential": []}"#);
    }

    #[test]
    fn offline_backend_is_unavailable() {
        let extractor = LlmExclusionExtractor::new(Arc::new(OfflineLlm), "medgemma:4b");
        assert!(matches!(
            extractor.extract("text"),
            Err(CollaboratorError::Unavailable(_))
        ));
    }
}
