//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use fieldex_resolver::{DEFAULT_ENDPOINT, DEFAULT_MAX_DOC_CHARS, DEFAULT_MODEL};

/// Main configuration for fieldex.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldexConfig {
    /// Pipeline timing and selection.
    pub pipeline: PipelineConfig,

    /// Fallback resolver connection.
    pub resolver: ResolverConfig,

    /// Knowledge base storage.
    pub store: StoreConfig,

    /// PDF layout extraction.
    pub layout: LayoutConfig,
}

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Wall-clock budget per request, in seconds.
    pub timeout_seconds: f64,

    /// Minimum remaining budget needed to call the resolver.
    pub min_time_for_llm: f64,

    /// Extra time granted to the resolver past the remaining budget.
    pub llm_slack_seconds: f64,

    /// Number of ranked candidates kept per field.
    pub top_k: usize,

    /// Call the resolver for uncertain fields.
    pub fallback_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 9.0,
            min_time_for_llm: 2.5,
            llm_slack_seconds: 1.0,
            top_k: 3,
            fallback_enabled: true,
        }
    }
}

impl PipelineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_seconds.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// Fallback resolver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Base URL of an OpenAI-compatible API.
    pub endpoint: String,

    /// Model name.
    pub model: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// HTTP client timeout, in seconds.
    pub timeout_seconds: f64,

    /// Document characters sent with the prompt.
    pub max_doc_chars: usize,

    /// Upper bound on generated tokens.
    pub max_output_tokens: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_seconds: 8.0,
            max_doc_chars: DEFAULT_MAX_DOC_CHARS,
            max_output_tokens: 500,
        }
    }
}

impl ResolverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_seconds.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// Knowledge base storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding one JSON record per label.
    pub kb_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kb_dir: PathBuf::from("data/kb"),
        }
    }
}

/// Layout extraction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Points within which text runs share a line.
    pub y_tolerance: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self { y_tolerance: 3.0 }
    }
}

impl FieldexConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}
