//! Completion provider abstraction and implementations.
//!
//! Defines the [`CompletionProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: fails every call; used when insights are turned off.
//! - **[`OpenAIProvider`]**: calls the OpenAI chat completions API.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/generate` endpoint.
//!
//! The API key is never stored in a provider or in process-wide state. It is
//! passed to every [`CompletionProvider::complete`] call as an [`ApiKey`].
//!
//! # Retry Strategy
//!
//! The HTTP providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::CompletionConfig;
use crate::error::ProviderError;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Caller-supplied credential for one request.
///
/// `Debug` never prints the key.
#[derive(Clone, Default)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("ApiKey(<empty>)")
        } else {
            f.write_str("ApiKey(<redacted>)")
        }
    }
}

/// A text-completion backend.
///
/// Implementations must be safe to call concurrently; the synthesizer shares
/// one provider across all in-flight chunks.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider identifier used in logs (e.g. `"openai"`).
    fn name(&self) -> &str;

    /// Complete `prompt`, producing at most `max_tokens` tokens.
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        credential: &ApiKey,
    ) -> Result<String, ProviderError>;
}

// ============ Disabled Provider ============

/// A provider that fails every call.
///
/// Backs `completion.provider = "disabled"`. The CLI and server skip synthesis
/// in that case, so this only answers when a caller forces insights on.
pub struct DisabledProvider;

#[async_trait]
impl CompletionProvider for DisabledProvider {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(
        &self,
        _prompt: &str,
        _max_tokens: u32,
        _credential: &ApiKey,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::new("completion provider is disabled"))
    }
}

// ============ OpenAI Provider ============

/// Completion provider using the OpenAI chat completions API.
///
/// Sends the prompt as a single user message to `POST /v1/chat/completions`.
pub struct OpenAIProvider {
    client: reqwest::Client,
    model: String,
    url: String,
    max_retries: u32,
}

impl OpenAIProvider {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        if config.model.trim().is_empty() {
            bail!("completion.model required for OpenAI provider");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string()),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        credential: &ApiKey,
    ) -> Result<String, ProviderError> {
        if credential.is_empty() {
            return Err(ProviderError::new("OpenAI API key not provided"));
        }

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": max_tokens,
        });
        let endpoint = format!("{}/v1/chat/completions", self.url.trim_end_matches('/'));

        let json = send_with_retry("OpenAI", self.max_retries, || {
            self.client
                .post(&endpoint)
                .header("Authorization", format!("Bearer {}", credential.expose()))
                .header("Content-Type", "application/json")
                .json(&body)
        })
        .await?;

        parse_openai_response(&json)
    }
}

/// Extract `choices[0].message.content` from a chat completion response.
fn parse_openai_response(json: &serde_json::Value) -> Result<String, ProviderError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| ProviderError::new("Invalid OpenAI response: missing choices[0].message.content"))
}

// ============ Ollama Provider ============

/// Completion provider using a local Ollama instance.
///
/// Calls `POST /api/generate` with streaming disabled. The credential is sent
/// as a bearer token only when non-empty (for Ollama behind an auth proxy).
pub struct OllamaProvider {
    client: reqwest::Client,
    model: String,
    url: String,
    max_retries: u32,
}

impl OllamaProvider {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        if config.model.trim().is_empty() {
            bail!("completion.model required for Ollama provider");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string()),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl CompletionProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        credential: &ApiKey,
    ) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "num_predict": max_tokens },
        });
        let endpoint = format!("{}/api/generate", self.url.trim_end_matches('/'));

        let json = send_with_retry("Ollama", self.max_retries, || {
            let request = self
                .client
                .post(&endpoint)
                .header("Content-Type", "application/json")
                .json(&body);
            if credential.is_empty() {
                request
            } else {
                request.header("Authorization", format!("Bearer {}", credential.expose()))
            }
        })
        .await?;

        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<String, ProviderError> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(str::to_string)
        .ok_or_else(|| ProviderError::new("Invalid Ollama response: missing response field"))
}

/// Send a JSON request, retrying rate limits, server errors, and network
/// failures with exponential backoff.
async fn send_with_retry<F>(
    label: &str,
    max_retries: u32,
    build: F,
) -> Result<serde_json::Value, ProviderError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(attempt, ?delay, "{} retry", label);
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json().await.map_err(|e| {
                        ProviderError::new(format!("{} returned invalid JSON: {}", label, e))
                    });
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = ProviderError::new(format!("{} API error {}: {}", label, status, body_text));

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(%status, attempt, "{} transient error", label);
                    last_err = Some(err);
                    continue;
                }

                return Err(err);
            }
            Err(e) => {
                warn!(error = %e, attempt, "{} request failed", label);
                last_err = Some(ProviderError::from(e));
                continue;
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| ProviderError::new(format!("{} completion failed after retries", label))))
}

/// Create a provider for the configured backend.
///
/// # Errors
///
/// Returns an error for unknown provider names or an unusable model setting.
pub fn create_provider(config: &CompletionConfig) -> Result<Arc<dyn CompletionProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown completion provider: {}", other),
    }
}
