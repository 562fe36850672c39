use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::chunk::DEFAULT_SEGMENT_CHARS;
use crate::keyword::DEFAULT_SNIPPET_RADIUS;

/// Default per-document upload limit (10 MB, decimal).
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 10_000_000;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub keywords: KeywordsConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub inputs: InputsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_max_document_bytes() -> usize {
    DEFAULT_MAX_DOCUMENT_BYTES
}
fn default_preview_chars() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_segment_chars")]
    pub segment_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            segment_chars: DEFAULT_SEGMENT_CHARS,
        }
    }
}

fn default_segment_chars() -> usize {
    DEFAULT_SEGMENT_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeywordsConfig {
    #[serde(default = "default_snippet_radius")]
    pub snippet_radius: usize,
    /// Treat keywords as raw regular expressions instead of literals.
    #[serde(default)]
    pub regex: bool,
}

impl Default for KeywordsConfig {
    fn default() -> Self {
        Self {
            snippet_radius: DEFAULT_SNIPPET_RADIUS,
            regex: false,
        }
    }
}

fn default_snippet_radius() -> usize {
    DEFAULT_SNIPPET_RADIUS
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL override (e.g. a proxy or a non-default Ollama host).
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable the CLI reads the API key from.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Concurrent completion calls per document.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Documents processed at the same time.
    #[serde(default = "default_documents_concurrency")]
    pub documents_concurrency: usize,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            url: None,
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            concurrency: default_concurrency(),
            documents_concurrency: default_documents_concurrency(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_tokens() -> u32 {
    200
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}
fn default_concurrency() -> usize {
    4
}
fn default_documents_concurrency() -> usize {
    2
}

impl CompletionConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputsConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.txt".to_string(),
        "**/*.docx".to_string(),
        "**/*.pptx".to_string(),
        "**/*.pdf".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Cap on one `/analyze` request body (base64 inflates uploads by a third).
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_request_bytes: default_max_request_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}
fn default_max_request_bytes() -> usize {
    64 * 1024 * 1024
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.limits.max_document_bytes == 0 {
        anyhow::bail!("limits.max_document_bytes must be > 0");
    }

    if config.chunking.segment_chars == 0 {
        anyhow::bail!("chunking.segment_chars must be > 0");
    }

    if config.completion.max_tokens == 0 {
        anyhow::bail!("completion.max_tokens must be > 0");
    }
    if config.completion.concurrency == 0 {
        anyhow::bail!("completion.concurrency must be >= 1");
    }
    if config.completion.documents_concurrency == 0 {
        anyhow::bail!("completion.documents_concurrency must be >= 1");
    }

    if config.server.max_request_bytes == 0 {
        anyhow::bail!("server.max_request_bytes must be > 0");
    }

    match config.completion.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown completion provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(())
}
