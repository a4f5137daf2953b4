use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline_config::PipelineConfig;

/// Application-level constants
pub const APP_NAME: &str = "PhenoRank";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default Ollama endpoint used by the LLM-backed collaborators.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default model name for extraction and synthesis.
pub const DEFAULT_MODEL: &str = "medgemma:4b";

/// Get the application data directory (~/PhenoRank/).
///
/// Falls back to the current directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default reference snapshot location.
pub fn default_reference_path() -> PathBuf {
    app_data_dir().join("reference").join("snapshot.json")
}

/// Default audit log location (JSON lines).
pub fn audit_log_path() -> PathBuf {
    app_data_dir().join("audit").join("sessions.jsonl")
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "phenorank=info,warn"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Process configuration assembled from the environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub reference_data: PathBuf,
    pub ollama_url: String,
    pub model: String,
    pub audit_log: PathBuf,
    pub pipeline: PipelineConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reference_data: default_reference_path(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            audit_log: audit_log_path(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Read `PHENORANK_*` overrides on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = lookup("PHENORANK_REFERENCE_DATA") {
            config.reference_data = PathBuf::from(path);
        }
        if let Some(url) = lookup("PHENORANK_OLLAMA_URL") {
            config.ollama_url = url;
        }
        if let Some(model) = lookup("PHENORANK_MODEL") {
            config.model = model;
        }
        if let Some(path) = lookup("PHENORANK_AUDIT_LOG") {
            config.audit_log = PathBuf::from(path);
        }
        if let Some(raw) = lookup("PHENORANK_TOP_N") {
            let top_n = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidValue {
                    name: "PHENORANK_TOP_N",
                    value: raw.clone(),
                })?;
            config.pipeline.top_n = top_n;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn audit_log_under_app_data() {
        let log = audit_log_path();
        assert!(log.starts_with(app_data_dir()));
        assert!(log.ends_with("sessions.jsonl"));
    }

    #[test]
    fn app_data_dir_named_after_app() {
        assert!(app_data_dir().ends_with(APP_NAME));
    }

    #[test]
    fn defaults_without_env() {
        let config = EngineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.ollama_url, DEFAULT_OLLAMA_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.pipeline.top_n, 15);
    }

    #[test]
    fn env_overrides_apply() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("PHENORANK_REFERENCE_DATA", "/data/snapshot.json"),
            ("PHENORANK_MODEL", "llama3"),
            ("PHENORANK_TOP_N", "5"),
        ]))
        .unwrap();
        assert_eq!(config.reference_data, PathBuf::from("/data/snapshot.json"));
        assert_eq!(config.model, "llama3");
        assert_eq!(config.pipeline.top_n, 5);
    }

    #[test]
    fn invalid_top_n_rejected() {
        let err = EngineConfig::from_lookup(lookup_from(&[("PHENORANK_TOP_N", "zero")]))
            .unwrap_err();
        assert!(err.to_string().contains("PHENORANK_TOP_N"));

        let err = EngineConfig::from_lookup(lookup_from(&[("PHENORANK_TOP_N", "0")]));
        assert!(err.is_err());
    }

    #[test]
    fn default_log_filter_targets_crate() {
        assert!(default_log_filter().starts_with("phenorank="));
    }
}
