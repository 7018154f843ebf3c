//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: fails every call; used when semantic search is off.
//! - **[`OpenAIProvider`]**: any OpenAI-compatible `POST {url}/embeddings` endpoint.
//! - **[`OllamaProvider`]**: a local Ollama instance's `/api/embed` endpoint.
//!
//! Also provides vector utilities for the embedding cache:
//! - [`cosine_similarity`] computes similarity between two vectors
//! - [`vec_to_blob`] / [`blob_to_vec`] convert to and from SQLite BLOBs
//!
//! # Retry Strategy
//!
//! Both HTTP providers retry transient failures with exponential backoff:
//! - HTTP 429 and 5xx → retry
//! - other 4xx → fail immediately
//! - network errors and timeouts → retry
//!
//! Every request carries `embedding.timeout_secs`. When retries run out the
//! call fails closed with [`WorkspaceError::Provider`]; nothing is cached.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::{Result, WorkspaceError};

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";
const BACKOFF_BASE_MS: u64 = 250;

/// A service that turns text into fixed-length vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier; part of every cache key.
    fn model_name(&self) -> &str;

    /// Embeds a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single text.
pub async fn embed_one(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    provider
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| WorkspaceError::Provider("empty embedding response".to_string()))
}

/// Build the provider described by `config`.
pub fn create_provider(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    if !config.is_enabled() {
        return Ok(Arc::new(DisabledProvider));
    }
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled Provider ============

pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(WorkspaceError::EmbeddingsDisabled)
    }
}

// ============ OpenAI Provider ============

/// OpenAI-compatible embeddings endpoint.
///
/// The key comes from `embedding.api_key`, falling back to the
/// `OPENAI_API_KEY` environment variable.
pub struct OpenAIProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    max_retries: u32,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = required_model(config)?;
        let base = config.url.as_deref().unwrap_or(OPENAI_DEFAULT_URL);
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());

        Ok(Self {
            client: http_client(config)?,
            endpoint: format!("{}/embeddings", base.trim_end_matches('/')),
            api_key,
            model,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = post_with_retry(self.max_retries, "OpenAI", || {
            let request = self.client.post(&self.endpoint).json(&body);
            match &self.api_key {
                Some(key) => request.bearer_auth(key),
                None => request,
            }
        })
        .await?;

        let vectors = parse_openai_response(&json)?;
        expect_count(vectors, texts.len())
    }
}

/// Extracts `data[].embedding`, ordered by `data[].index` when present.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| malformed("missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| malformed("missing embedding"))?;
        indexed.push((index, parse_vector(embedding)?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
pub struct OllamaProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_retries: u32,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = required_model(config)?;
        let base = config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL);
        Ok(Self {
            client: http_client(config)?,
            endpoint: format!("{}/api/embed", base.trim_end_matches('/')),
            model,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = post_with_retry(self.max_retries, "Ollama", || {
            self.client.post(&self.endpoint).json(&body)
        })
        .await?;

        let vectors = parse_ollama_response(&json)?;
        expect_count(vectors, texts.len())
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| malformed("missing embeddings array"))?
        .iter()
        .map(parse_vector)
        .collect()
}

// ============ Shared HTTP plumbing ============

fn required_model(config: &EmbeddingConfig) -> anyhow::Result<String> {
    config
        .model
        .clone()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "embedding.model required for the {} provider",
                config.provider
            )
        })
}

fn http_client(config: &EmbeddingConfig) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

async fn post_with_retry<F>(
    max_retries: u32,
    label: &str,
    build: F,
) -> Result<serde_json::Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_millis(BACKOFF_BASE_MS << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response.json().await.map_err(|e| {
                        WorkspaceError::Provider(format!("{} returned invalid JSON: {}", label, e))
                    });
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = format!("{} API error {}: {}", label, status, body_text);
                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::debug!(attempt, "{}", err);
                    last_err = Some(err);
                    continue;
                }
                return Err(WorkspaceError::Provider(err));
            }
            Err(e) => {
                let err = if e.is_timeout() {
                    format!("{} request timed out", label)
                } else {
                    format!("{} request failed: {}", label, e)
                };
                tracing::debug!(attempt, "{}", err);
                last_err = Some(err);
            }
        }
    }

    Err(WorkspaceError::Provider(last_err.unwrap_or_else(|| {
        format!("{} embedding failed after retries", label)
    })))
}

fn parse_vector(value: &serde_json::Value) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| malformed("embedding is not an array"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| malformed("embedding contains a non-number"))
        })
        .collect()
}

fn expect_count(vectors: Vec<Vec<f32>>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != expected {
        return Err(WorkspaceError::Provider(format!(
            "expected {} embeddings, got {}",
            expected,
            vectors.len()
        )));
    }
    if vectors.iter().any(|v| v.is_empty()) {
        return Err(malformed("empty vector"));
    }
    Ok(vectors)
}

fn malformed(what: &str) -> WorkspaceError {
    WorkspaceError::Provider(format!("invalid embedding response: {}", what))
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB of little-endian `f32` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

/// Maps a cosine similarity onto the 0–100 score clients display.
pub fn similarity_score(cosine: f32) -> u8 {
    (cosine.clamp(0.0, 1.0) * 100.0).round() as u8
}
