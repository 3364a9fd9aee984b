//! Embedding capability: the pipeline's contract with embedding models.
//!
//! The pipeline treats embedding as a black box that maps texts to
//! fixed-dimension vectors. [`OpenAiEmbedder`] talks to OpenAI-compatible
//! `/embeddings` endpoints; [`MockEmbedder`] produces deterministic vectors
//! for tests and offline runs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::IngestError;

/// Maps batches of texts to fixed-dimension vectors.
///
/// Implementations must be safe for concurrent use; the pipeline shares one
/// client behind an `Arc`.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embeds `texts`, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError>;

    /// Vector dimension this client produces. Must match the vector-store
    /// index configuration.
    fn dimension(&self) -> usize;

    /// Largest batch a single `embed` call accepts.
    fn max_batch(&self) -> usize {
        64
    }
}

/// Connection settings for an OpenAI-compatible embeddings endpoint.
///
/// Credentials are passed in explicitly; the crate never reads them from the
/// process environment.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
    pub timeout: Duration,
    pub max_retries: usize,
    pub max_batch: usize,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            max_batch: 64,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>, dimension: usize) -> Self {
        self.model = model.into();
        self.dimension = dimension;
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Embeddings client for OpenAI-compatible endpoints.
///
/// Transient failures (429, 5xx, transport errors) are retried with
/// exponential backoff up to `max_retries` attempts. Retry stays contained
/// here; the pipeline stages themselves never retry.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    config: OpenAiConfig,
}

impl OpenAiEmbedder {
    pub fn new(client: Client, config: OpenAiConfig) -> Result<Self, IngestError> {
        if config.api_key.trim().is_empty() {
            return Err(IngestError::Config("missing embedding API key".into()));
        }
        if config.model.trim().is_empty() {
            return Err(IngestError::Config("missing embedding model name".into()));
        }
        let endpoint = format!("{}/embeddings", config.base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    async fn request_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        };

        let mut attempt = 0usize;
        loop {
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(self.config.api_key.trim())
                .timeout(self.config.timeout)
                .json(&request)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: EmbeddingResponse = resp.json().await.map_err(|err| {
                            IngestError::Embedding(format!(
                                "failed to parse embedding response: {err}"
                            ))
                        })?;
                        return self.verify(parsed, texts.len());
                    }

                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.config.max_retries {
                        attempt += 1;
                        debug!(attempt, %status, "retrying embedding request");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(IngestError::Embedding(format!(
                        "embedding request failed ({status}): {body}"
                    )));
                }
                Err(err) => {
                    let retryable = err.is_timeout() || err.is_connect() || err.is_request();
                    if retryable && attempt + 1 < self.config.max_retries {
                        attempt += 1;
                        debug!(attempt, error = %err, "retrying embedding request");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(IngestError::Embedding(err.to_string()));
                }
            }
        }
    }

    fn verify(
        &self,
        response: EmbeddingResponse,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>, IngestError> {
        if response.data.len() != expected {
            return Err(IngestError::Embedding(format!(
                "endpoint returned {} vectors for {} inputs",
                response.data.len(),
                expected
            )));
        }
        let mut data = response.data;
        data.sort_by_key(|entry| entry.index);
        for entry in &data {
            if entry.embedding.len() != self.config.dimension {
                return Err(IngestError::Embedding(format!(
                    "endpoint returned a {}-dimension vector, expected {}",
                    entry.embedding.len(),
                    self.config.dimension
                )));
            }
        }
        Ok(data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.len() > self.config.max_batch {
            return Err(IngestError::Embedding(format!(
                "batch of {} exceeds configured max {}",
                texts.len(),
                self.config.max_batch
            )));
        }
        self.request_batch(texts).await
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn max_batch(&self) -> usize {
        self.config.max_batch
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Deterministic embedder for tests and offline runs. Identical texts map
/// to identical vectors; no network access.
#[derive(Clone, Debug)]
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingClient for MockEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        Ok(texts
            .iter()
            .map(|text| hash_to_vec(text, self.dimension))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn hash_to_vec(text: &str, dimension: usize) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let seed = hasher.finish();
    (0..dimension)
        .map(|i| {
            let bits = seed.rotate_left((i % 64) as u32) ^ ((i as u64) << 24);
            (bits as f32) / u32::MAX as f32
        })
        .collect()
}
