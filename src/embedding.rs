//! Embedder abstraction and implementations (spec §4.B).
//!
//! Defines the [`Embedder`] trait and two concrete implementations:
//! - **[`HashEmbedder`]** — deterministic vectors derived from a SHA-256
//!   digest of the input text; the default, used for self-hosted installs
//!   without a remote API key and for the test suite.
//! - **[`OpenAiEmbedder`]** — calls an OpenAI-compatible embeddings API with
//!   batching and exponential-backoff retry.
//!
//! Also provides vector utilities for the SQLite chunk store:
//! - [`cosine_similarity`] — similarity between two embedding vectors.
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian `f32` BLOB codec.
//!
//! # Retry strategy
//!
//! The OpenAI embedder retries transient failures with exponential backoff
//! (base 500ms, factor 2, capped at 8s), per §4.D.5:
//! - HTTP 429 / 5xx and network errors → retry, surfaced as `UpstreamUnavailable`.
//! - Other HTTP 4xx → fail immediately, surfaced as `Validation` (permanent).

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::errors::AppError;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;
    fn dimension(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError>;
}

pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, AppError> {
    let mut results = embedder.embed_batch(std::slice::from_ref(&text.to_string())).await?;
    results.pop().ok_or_else(|| AppError::store("embedder returned no vector for a single input"))
}

/// Constructs the process-wide embedder named by `EMBEDDER_MODEL`:
/// `"hash"` (default) selects [`HashEmbedder`]; `"openai:<model>"` selects
/// [`OpenAiEmbedder`].
pub fn create_embedder(model: &str, dimension: usize) -> anyhow::Result<Box<dyn Embedder>> {
    if let Some(model_name) = model.strip_prefix("openai:") {
        Ok(Box::new(OpenAiEmbedder::new(model_name.to_string(), dimension)?))
    } else if model == "hash" || model.is_empty() {
        Ok(Box::new(HashEmbedder::new(dimension)))
    } else {
        anyhow::bail!("unknown EMBEDDER_MODEL {model:?}: expected \"hash\" or \"openai:<model>\"")
    }
}

// ============ Hash Embedder ============

/// A deterministic embedder that expands a SHA-256 digest of the input
/// text into `dimension` floats in `[-1.0, 1.0]`. No network calls, no
/// external dependency — used whenever a real embedding model isn't
/// configured, per the fake-embedder note in the design notes.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = Vec::with_capacity(self.dimension);
        let mut counter: u64 = 0;
        while vector.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            for byte in digest {
                if vector.len() == self.dimension {
                    break;
                }
                vector.push((byte as f32 / 255.0) * 2.0 - 1.0);
            }
            counter += 1;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

// ============ OpenAI-compatible Embedder ============

pub struct OpenAiEmbedder {
    model: String,
    dimension: usize,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(model: String, dimension: usize) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self { model, dimension, api_key, client, max_retries: 5 })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let mut last_err: Option<AppError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay_ms = 500u64 * 2u64.pow((attempt - 1).min(4));
                let delay = Duration::from_millis(delay_ms.min(8_000));
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying embedder call");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| AppError::upstream_unavailable("embedder.bad_response", e.to_string()))?;
                        return parse_openai_response(&json);
                    }
                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(AppError::upstream_unavailable(
                            "embedder.unavailable",
                            format!("embedding API error {status}: {body_text}"),
                        ));
                        continue;
                    }
                    return Err(AppError::validation(
                        "embedder.input_rejected",
                        format!("embedding API rejected input with {status}: {body_text}"),
                    ));
                }
                Err(e) => {
                    last_err = Some(AppError::upstream_unavailable("embedder.unavailable", e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| AppError::upstream_unavailable("embedder.unavailable", "embedding failed after retries")))
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, AppError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| AppError::upstream_unavailable("embedder.bad_response", "missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| AppError::upstream_unavailable("embedder.bad_response", "missing embedding field"))?;
        let vec: Vec<f32> = embedding.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect();
        embeddings.push(vec);
    }
    Ok(embeddings)
}

// ============ Vector utilities ============

pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

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
