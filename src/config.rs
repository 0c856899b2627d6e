//! Configuration for the evaluation pipeline.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Inference backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the Ollama-compatible server (e.g., "http://localhost:11434")
    pub api_base: String,

    /// Sampling temperature passed to the backend (backend default if unset)
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter (backend default if unset)
    #[serde(default)]
    pub top_p: Option<f32>,

    /// Request timeout in seconds. No timeout when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_api_base() -> String {
    "http://localhost:11434".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            temperature: None,
            top_p: None,
            timeout_secs: None,
        }
    }
}

/// Blind ranking judge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Model asked to rank the anonymized candidates.
    pub arbiter_model: String,

    /// Attempts per question before it is recorded as unjudged.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff between attempts (milliseconds).
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Pause between questions (milliseconds).
    #[serde(default = "default_question_delay_ms")]
    pub question_delay_ms: u64,

    #[serde(default = "default_judge_temperature")]
    pub temperature: f32,

    #[serde(default = "default_judge_top_p")]
    pub top_p: f32,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_question_delay_ms() -> u64 {
    500
}

fn default_judge_temperature() -> f32 {
    0.1
}

fn default_judge_top_p() -> f32 {
    0.9
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            arbiter_model: "gemma3:1b".to_string(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            question_delay_ms: default_question_delay_ms(),
            temperature: default_judge_temperature(),
            top_p: default_judge_top_p(),
        }
    }
}

/// Embedding encoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Encoder used for math and proof datasets.
    pub math_model_id: String,

    /// Encoder used for every other dataset.
    pub text_model_id: String,

    /// Token window size for chunking long texts.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

fn default_max_tokens() -> usize {
    512
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            math_model_id: "tbs17/MathBERT".to_string(),
            text_model_id: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl EmbeddingConfig {
    /// Pick the encoder for a dataset file: math and proof sets get the math encoder.
    pub fn model_for_dataset(&self, path: &Path) -> &str {
        if is_math_dataset(path) {
            &self.math_model_id
        } else {
            &self.text_model_id
        }
    }
}

/// Math and proof datasets are recognized by file name.
pub fn is_math_dataset(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_lowercase();
    name.contains("math") || name.contains("proofs")
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Inference backend settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Judge settings
    #[serde(default)]
    pub judge: JudgeConfig,

    /// Embedding settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    backend: Option<BackendFileSection>,
    judge: Option<JudgeFileSection>,
    embedding: Option<EmbeddingFileSection>,
}

#[derive(Debug, Deserialize)]
struct BackendFileSection {
    api_base: Option<String>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct JudgeFileSection {
    arbiter_model: Option<String>,
    max_attempts: Option<u32>,
    backoff_base_ms: Option<u64>,
    question_delay_ms: Option<u64>,
    temperature: Option<f32>,
    top_p: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingFileSection {
    math_model_id: Option<String>,
    text_model_id: Option<String>,
    max_tokens: Option<usize>,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (OLLAMA_HOST, EVAL_API_BASE, EVAL_JUDGE_MODEL, ...)
    /// 2. Config file (~/.config/answer-eval/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(host) = env::var("OLLAMA_HOST") {
            self.backend.api_base = normalize_host(&host);
        }

        if let Ok(api_base) = env::var("EVAL_API_BASE") {
            self.backend.api_base = api_base;
        }

        if let Some(temp) = env_parse("EVAL_TEMPERATURE") {
            self.backend.temperature = Some(temp);
        }

        if let Some(top_p) = env_parse("EVAL_TOP_P") {
            self.backend.top_p = Some(top_p);
        }

        if let Some(secs) = env_parse("EVAL_TIMEOUT_SECS") {
            self.backend.timeout_secs = Some(secs);
        }

        if let Ok(model) = env::var("EVAL_JUDGE_MODEL") {
            self.judge.arbiter_model = model;
        }

        if let Ok(model) = env::var("EVAL_EMBEDDING_MODEL") {
            self.embedding.math_model_id = model.clone();
            self.embedding.text_model_id = model;
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        Self::from_yaml(&content)
    }

    fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| EvalError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(backend) = file_config.backend {
            if let Some(api_base) = backend.api_base {
                config.backend.api_base = api_base;
            }
            config.backend.temperature = backend.temperature.or(config.backend.temperature);
            config.backend.top_p = backend.top_p.or(config.backend.top_p);
            config.backend.timeout_secs = backend.timeout_secs.or(config.backend.timeout_secs);
        }

        if let Some(judge) = file_config.judge {
            if let Some(model) = judge.arbiter_model {
                config.judge.arbiter_model = model;
            }
            if let Some(attempts) = judge.max_attempts {
                config.judge.max_attempts = attempts;
            }
            if let Some(base) = judge.backoff_base_ms {
                config.judge.backoff_base_ms = base;
            }
            if let Some(delay) = judge.question_delay_ms {
                config.judge.question_delay_ms = delay;
            }
            if let Some(temperature) = judge.temperature {
                config.judge.temperature = temperature;
            }
            if let Some(top_p) = judge.top_p {
                config.judge.top_p = top_p;
            }
        }

        if let Some(embedding) = file_config.embedding {
            if let Some(model) = embedding.math_model_id {
                config.embedding.math_model_id = model;
            }
            if let Some(model) = embedding.text_model_id {
                config.embedding.text_model_id = model;
            }
            if let Some(max_tokens) = embedding.max_tokens {
                config.embedding.max_tokens = max_tokens;
            }
        }

        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "answer-eval")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that required configuration is present.
    pub fn validate(&self) -> Result<()> {
        if self.backend.api_base.is_empty() {
            return Err(EvalError::Config(
                "Backend API base URL is required. Set OLLAMA_HOST or EVAL_API_BASE, or add it to the config file.".to_string(),
            ));
        }

        if self.judge.max_attempts == 0 {
            return Err(EvalError::Config(
                "judge.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.embedding.max_tokens == 0 {
            return Err(EvalError::Config(
                "embedding.max_tokens must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Create a config pointing at an explicit backend (useful for testing).
    pub fn with_backend(api_base: impl Into<String>) -> Self {
        Self {
            backend: BackendConfig {
                api_base: api_base.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

/// `OLLAMA_HOST` is often given without a scheme ("127.0.0.1:11434").
fn normalize_host(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}
