//! Ollama backend for embeddings and chat completions.
//!
//! Talks to a local Ollama server over its HTTP API using `reqwest`:
//! `POST /api/embed` for embeddings and `POST /api/chat` (non-streaming) for
//! chat responses.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::DEFAULT_EMBEDDING_MODEL;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::ChatModel;

/// The default Ollama server address.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Connection settings for an Ollama server.
#[derive(Debug, Clone, PartialEq)]
pub struct OllamaConfig {
    /// Base URL of the server, without a trailing slash.
    pub base_url: String,
    /// Model used for embeddings.
    pub embedding_model: String,
    /// Per-request timeout. Generation on large local models can be slow.
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

impl OllamaConfig {
    /// Defaults overlaid with the `OLLAMA_HOST` environment variable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            config.base_url = normalize_base_url(&host);
        }
        config
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl AsRef<str>) -> Self {
        self.base_url = normalize_base_url(url.as_ref());
        self
    }

    /// Set the embedding model.
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// `OLLAMA_HOST` is commonly given without a scheme (`127.0.0.1:11434`).
fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

/// A client for a local Ollama server.
///
/// Implements both [`EmbeddingProvider`] (bound to the configured embedding
/// model) and [`ChatModel`] (model chosen per call).
///
/// # Example
///
/// ```rust,ignore
/// use orinda_rag::ollama::{OllamaClient, OllamaConfig};
///
/// let client = OllamaClient::new(OllamaConfig::from_env())?;
/// let answer = client.chat("llama3.2:latest", "Hello!").await?;
/// ```
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    embedding_model: String,
    name: String,
}

impl OllamaClient {
    /// Create a new client from `config`.
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build().map_err(|e| {
            RagError::Config(format!("failed to build HTTP client: {e}"))
        })?;
        let name = format!("Ollama/{}", config.embedding_model);
        Ok(Self {
            client,
            base_url: config.base_url,
            embedding_model: config.embedding_model,
            name,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn embedding_error(&self, message: impl Into<String>) -> RagError {
        RagError::Embedding { provider: self.name.clone(), message: message.into() }
    }
}

// ── Ollama API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Pull the `error` field out of an Ollama error body, falling back to the raw body.
fn error_detail(body: String) -> String {
    serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body)
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = %self.name, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| self.embedding_error("API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = %self.name, batch_size = texts.len(), "embedding batch");

        let request_body = EmbedRequest { model: &self.embedding_model, input: texts.to_vec() };

        let response =
            self.client.post(self.url("/api/embed")).json(&request_body).send().await.map_err(
                |e| {
                    error!(provider = %self.name, error = %e, "request failed");
                    self.embedding_error(format!("request failed: {e}"))
                },
            )?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(provider = %self.name, %status, "API error");
            return Err(
                self.embedding_error(format!("API returned {status}: {}", error_detail(body)))
            );
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| {
            error!(provider = %self.name, error = %e, "failed to parse response");
            self.embedding_error(format!("failed to parse response: {e}"))
        })?;

        if parsed.embeddings.len() != texts.len() {
            return Err(self.embedding_error(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }

        Ok(parsed.embeddings)
    }
}

// ── ChatModel implementation ───────────────────────────────────────

#[async_trait]
impl ChatModel for OllamaClient {
    async fn chat(&self, model: &str, prompt: &str) -> Result<String> {
        let model_error = |message: String| RagError::Model { model: model.to_string(), message };

        debug!(model, prompt_len = prompt.len(), "sending chat request");

        let request_body = ChatRequest {
            model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            stream: false,
        };

        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(model, error = %e, "chat request failed");
                model_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(model, %status, "chat API error");
            return Err(model_error(format!("API returned {status}: {}", error_detail(body))));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            error!(model, error = %e, "failed to parse chat response");
            model_error(format!("failed to parse response: {e}"))
        })?;

        Ok(parsed.message.content)
    }
}
