//! Configuration for the benchmark harness.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{BenchError, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Hard ceiling on concurrent outbound LLM calls.
pub const MAX_WORKERS: usize = 15;

/// LLM configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Default model name
    pub model: String,

    /// Maximum tokens for response; unset leaves the limit to the server
    pub max_tokens: Option<u32>,

    /// Temperature for generation
    pub temperature: f32,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: None,
            temperature: 0.0,
            timeout_secs: 120,
        }
    }
}

/// Judge (scoring) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    /// Model used to grade answers. Always called at temperature 0.
    pub model: String,
    /// Concurrent scoring calls.
    pub workers: usize,
    /// Samples per row; more than one takes the majority verdict.
    pub samples: usize,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo-0125".to_string(),
            workers: 8,
            samples: 1,
        }
    }
}

/// How questions share context inside one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConversationMode {
    /// Each question sees every earlier question and answer.
    #[default]
    Cumulative,
    /// Each question sees only the system prompt and the artifact.
    Independent,
}

/// Question-answering fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerConfig {
    /// Models asked about every artifact.
    pub models: Vec<String>,
    /// Concurrent conversations.
    pub workers: usize,
    /// Context sharing between questions.
    pub mode: ConversationMode,
    /// Overrides the built-in answering system prompt.
    pub system_prompt: Option<String>,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            models: vec!["gpt-3.5-turbo".to_string()],
            workers: 4,
            mode: ConversationMode::default(),
            system_prompt: None,
        }
    }
}

/// Remote document-parsing service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseServiceConfig {
    pub api_base: String,
    pub api_key: String,
    pub language: String,
    /// Delay between job status polls.
    pub poll_interval_ms: u64,
    /// Give up after this many polls.
    pub max_polls: u32,
}

impl Default for ParseServiceConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.cloud.llamaindex.ai".to_string(),
            api_key: String::new(),
            language: "en".to_string(),
            poll_interval_ms: 2000,
            max_polls: 300,
        }
    }
}

/// Embedding endpoint settings for the `search` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            batch_size: 32,
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

/// External OCR and layout tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub pdftotext: String,
    pub pdftoppm: String,
    pub tesseract: String,
    pub dpi: u32,
    pub language: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            pdftotext: "pdftotext".to_string(),
            pdftoppm: "pdftoppm".to_string(),
            tesseract: "tesseract".to_string(),
            dpi: 300,
            language: "eng".to_string(),
        }
    }
}

/// File locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Metrics table; defaults to `<output_dir>/performance_metrics.csv`.
    pub metrics_file: Option<PathBuf>,
    /// Directory for answer and score tables.
    pub results_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            metrics_file: None,
            results_dir: PathBuf::from("results"),
        }
    }
}

impl PathsConfig {
    /// Metrics table path for a given output directory.
    pub fn metrics_file_for(&self, output_dir: &Path) -> PathBuf {
        self.metrics_file
            .clone()
            .unwrap_or_else(|| output_dir.join("performance_metrics.csv"))
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub judge: JudgeConfig,
    pub answer: AnswerConfig,
    pub parse_service: ParseServiceConfig,
    pub embeddings: EmbeddingConfig,
    pub ocr: OcrConfig,
    pub retry: RetryPolicy,
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration from environment variables and an optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_API_BASE, LLM_API_KEY, LLM_MODEL, ...)
    /// 2. Config file (`explicit` or ~/.config/pdf-qa-bench/config.yaml)
    /// 3. Default values
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::config_file_path() {
                Some(path) if path.exists() => Self::load_from_file(&path)?,
                _ => Config::default(),
            },
        };

        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text. Missing sections keep defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| BenchError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Override values from environment-style lookups.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_base) = lookup("LLM_API_BASE") {
            self.llm.api_base = api_base;
        }
        if let Some(api_key) = lookup("LLM_API_KEY") {
            self.llm.api_key = api_key;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(tokens) = lookup("LLM_MAX_TOKENS").and_then(|v| v.parse().ok()) {
            self.llm.max_tokens = Some(tokens);
        }
        if let Some(temp) = lookup("LLM_TEMPERATURE").and_then(|v| v.parse().ok()) {
            self.llm.temperature = temp;
        }
        if let Some(model) = lookup("JUDGE_MODEL") {
            self.judge.model = model;
        }
        if let Some(models) = lookup("ANSWER_MODELS") {
            let models: Vec<String> = models
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
            if !models.is_empty() {
                self.answer.models = models;
            }
        }
        if let Some(api_base) = lookup("PARSE_API_BASE") {
            self.parse_service.api_base = api_base;
        }
        if let Some(api_key) = lookup("PARSE_API_KEY") {
            self.parse_service.api_key = api_key;
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            self.embeddings.model = model;
        }
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "pdf-qa-bench")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that the LLM endpoint is configured.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(BenchError::Config(
                "LLM API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(BenchError::Config(
                "LLM API key is required. Set LLM_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        if self.answer.models.is_empty() {
            return Err(BenchError::Config(
                "At least one answering model is required (answer.models or ANSWER_MODELS)."
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Answer workers clamped to `1..=MAX_WORKERS`.
    pub fn answer_workers(&self) -> usize {
        self.answer.workers.clamp(1, MAX_WORKERS)
    }

    /// Judge workers clamped to `1..=MAX_WORKERS`.
    pub fn judge_workers(&self) -> usize {
        self.judge.workers.clamp(1, MAX_WORKERS)
    }

    /// Create a config from explicit values (useful for testing).
    pub fn with_llm(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm: LlmConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.llm.api_base.is_empty());
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert_eq!(config.judge.model, "gpt-3.5-turbo-0125");
        assert_eq!(config.answer.mode, ConversationMode::Cumulative);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_validate_fails_without_required_fields() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let config = Config::with_llm("https://api.example.com", "key", "gpt-4");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
llm:
  api_base: "https://proxy.example.com"
answer:
  models: ["model-a", "model-b"]
  mode: independent
retry:
  max_attempts: 5
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.llm.api_base, "https://proxy.example.com");
        assert_eq!(config.llm.max_tokens, None);
        assert_eq!(config.answer.models, vec!["model-a", "model-b"]);
        assert_eq!(config.answer.mode, ConversationMode::Independent);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.ocr.dpi, 300);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::from_yaml("llm:\n  model: from-file\n").unwrap();
        let vars: HashMap<&str, &str> = [
            ("LLM_MODEL", "from-env"),
            ("ANSWER_MODELS", "a, b,,c"),
            ("LLM_TEMPERATURE", "not-a-number"),
            ("LLM_MAX_TOKENS", "512"),
        ]
        .into_iter()
        .collect();

        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.llm.model, "from-env");
        assert_eq!(config.answer.models, vec!["a", "b", "c"]);
        assert_eq!(config.llm.temperature, 0.0);
        assert_eq!(config.llm.max_tokens, Some(512));
    }

    #[test]
    fn test_workers_are_clamped() {
        let mut config = Config::default();
        config.answer.workers = 64;
        config.judge.workers = 0;
        assert_eq!(config.answer_workers(), MAX_WORKERS);
        assert_eq!(config.judge_workers(), 1);
    }

    #[test]
    fn test_metrics_file_default() {
        let paths = PathsConfig::default();
        assert_eq!(
            paths.metrics_file_for(Path::new("out")),
            PathBuf::from("out/performance_metrics.csv")
        );
    }
}
