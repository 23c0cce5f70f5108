//! Typed application configuration.
//!
//! Loaded from a YAML file with per-concern immutable structs. Secrets are
//! never written in the file directly: `${ENV_VAR}` values are resolved at
//! load time, and the reasoning API key additionally falls back to the
//! `REASONING_API_KEY` environment variable.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default config file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Configuration parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Per-concern sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub output_folder: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "qualpipe".into(),
            output_folder: "analysis_output".into(),
        }
    }
}

/// Model limits and connection settings for the reasoning service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub base_url: String,
    pub model: String,
    /// Model context window in tokens.
    pub max_tokens: usize,
    /// Tokens reserved for the structured response.
    pub response_tokens: usize,
    /// Margin kept free on top of prompt + response.
    pub safety_buffer: usize,
    pub temperature: f32,
    pub max_concurrent_requests: usize,
    pub timeout_secs: u64,
    pub api_key: Option<String>,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-5-nano".into(),
            max_tokens: 128_000,
            response_tokens: 16_000,
            safety_buffer: 2_000,
            temperature: 0.2,
            max_concurrent_requests: 8,
            timeout_secs: 300,
            api_key: None,
        }
    }
}

/// Optional vector capability. Disabled by default; absence is silent.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub enabled: bool,
    pub embedding_model: String,
    pub dimension: usize,
    pub top_k: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            embedding_model: "text-embedding-ada-002".into(),
            dimension: 1536,
            top_k: 10,
        }
    }
}

/// Batch sizing knobs for the analysis stages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Preferred input-token size of an emergent-analysis chunk. The model
    /// window may afford less; the chunker takes the minimum.
    pub target_input_tokens_per_chunk: usize,
    /// Count-based group size for question-mapping requests.
    pub verbatim_batch_size: usize,
    /// Count-based group size for per-topic strategic requests.
    pub strategic_analysis_batch_size: usize,
    /// Cap on verbatims quoted in one strategic prompt.
    pub max_verbatims_per_topic: usize,
    /// Token estimation scheme name; unknown names fall back to the default.
    pub token_scheme: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            target_input_tokens_per_chunk: 60_000,
            verbatim_batch_size: 20,
            strategic_analysis_batch_size: 5,
            max_verbatims_per_topic: 50,
            token_scheme: "cl100k".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub supported_extensions: Vec<String>,
    /// Lower-cased substrings that mark a file as the discussion guide.
    pub guide_keywords: Vec<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            supported_extensions: vec![".txt".into(), ".md".into()],
            guide_keywords: vec!["guide".into(), "discussion".into(), "dg".into()],
        }
    }
}

/// Regex patterns for transcript line parsing and the translation predicate.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Speaker + timestamp + text, three capture groups.
    pub speaker_timestamp: String,
    /// Speaker + text, two capture groups.
    pub speaker: String,
    /// Text matching this needs translation before analysis.
    pub needs_translation: String,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            speaker_timestamp:
                r"^([^:：\[\(]{1,60}?)\s*[\[\(（](\d{1,2}:\d{2}(?::\d{2})?)[\]\)）]\s*[:：]\s*(.*)$"
                    .into(),
            speaker: r"^([^:：]{1,60}?)\s*[:：]\s*(.*)$".into(),
            needs_translation: r"[\u{4e00}-\u{9fff}]".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub enabled: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// When false, every reasoning call returns the dry-run sentinel.
    pub execute_api_calls: bool,
    pub debug_logging: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            execute_api_calls: true,
            debug_logging: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub reasoning: ReasoningConfig,
    pub vector: VectorConfig,
    pub processing: ProcessingConfig,
    pub files: FileConfig,
    pub patterns: PatternConfig,
    pub export: ExportConfig,
    pub runtime: RuntimeConfig,
}

impl AppConfig {
    /// Load from an explicit path, or from `config.yaml` in the working
    /// directory, or fall back to built-in defaults when neither exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::FileNotFound(p.to_path_buf()));
                }
                Self::from_file(p)?
            }
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };

        config.resolve_secrets();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Resolve `${ENV_VAR}` indirection in the API key and apply the
    /// `REASONING_API_KEY` fallback. An indirection pointing at an unset
    /// variable resolves to no key at all — an absent key is legal until
    /// the moment an executing client is built (dry-run never needs one).
    fn resolve_secrets(&mut self) {
        if let Some(key) = &self.reasoning.api_key {
            if let Some(var) = key.strip_prefix("${").and_then(|k| k.strip_suffix('}')) {
                match std::env::var(var) {
                    Ok(value) if !value.is_empty() => {
                        self.reasoning.api_key = Some(value);
                    }
                    _ => {
                        tracing::debug!(var, "API key environment variable not set");
                        self.reasoning.api_key = None;
                    }
                }
            }
        }

        if self.reasoning.api_key.is_none() {
            if let Ok(value) = std::env::var("REASONING_API_KEY") {
                if !value.is_empty() {
                    self.reasoning.api_key = Some(value);
                }
            }
        }
    }

    /// Reject configurations that cannot produce a working pipeline.
    /// Runs before any stage starts; failures here are always fatal.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.reasoning.max_concurrent_requests == 0 {
            return Err(ConfigError::Invalid(
                "reasoning.max_concurrent_requests must be positive".into(),
            ));
        }
        if self.reasoning.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "reasoning.timeout_secs must be positive".into(),
            ));
        }

        let reserved = crate::pipeline::chunker::BASE_PROMPT_OVERHEAD_TOKENS
            + self.reasoning.response_tokens
            + self.reasoning.safety_buffer;
        if self.reasoning.max_tokens <= reserved {
            return Err(ConfigError::Invalid(format!(
                "reasoning.max_tokens ({}) leaves no room for input after \
                 reserving {} tokens for prompt overhead, response and safety buffer",
                self.reasoning.max_tokens, reserved
            )));
        }

        if self.processing.target_input_tokens_per_chunk == 0 {
            return Err(ConfigError::Invalid(
                "processing.target_input_tokens_per_chunk must be positive".into(),
            ));
        }
        if self.processing.verbatim_batch_size == 0
            || self.processing.strategic_analysis_batch_size == 0
        {
            return Err(ConfigError::Invalid(
                "processing batch sizes must be positive".into(),
            ));
        }

        Ok(())
    }
}

/// Default tracing filter, overridable via `RUST_LOG`.
pub fn default_log_filter(debug: bool) -> String {
    if debug {
        "qualpipe=debug,info".into()
    } else {
        "info".into()
    }
}
