//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait plus three backends:
//! - **[`OllamaProvider`]** — calls a local Ollama server's embed API.
//! - **[`OpenAiProvider`]** — calls the OpenAI embeddings API.
//! - **[`HashProvider`]** — deterministic bag-of-words vectors with no
//!   network dependency; useful offline and in tests.
//!
//! Queries must be embedded with the same provider and model used at
//! ingestion. That is enforced by configuration (one `[embedding]` section
//! drives both paths), not by runtime checks.
//!
//! Transient failures (network errors, HTTP 429/5xx) are retried by
//! [`embed_with_retry`] with exponential backoff: 1s, 2s, 4s, … capped at
//! 32s. Permanent failures (other 4xx, malformed responses) fail the file
//! immediately.
//!
//! Also provides vector utilities:
//! - [`cosine_similarity`] — similarity between two embedding vectors
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian f32 BLOB codec for
//!   SQLite storage

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::EmbeddingConfig;

/// Embedding failure, split by whether a retry can help.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("transient embedding failure: {0}")]
    Transient(String),

    #[error("permanent embedding failure: {0}")]
    Permanent(String),
}

impl EmbedError {
    pub fn is_transient(&self) -> bool {
        matches!(self, EmbedError::Transient(_))
    }
}

/// A backend that maps texts to fixed-length vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;

    /// Embedding vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    /// A single attempt; retry policy lives in [`embed_with_retry`].
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Instantiate the provider named in the configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiProvider::new(config)?)),
        "hash" => Ok(Arc::new(HashProvider::new(
            config.dims.unwrap_or(0),
        )?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embed a batch, retrying transient failures with exponential backoff.
pub async fn embed_with_retry(
    provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        match provider.embed_batch(texts).await {
            Ok(vectors) => {
                if vectors.len() != texts.len() {
                    return Err(EmbedError::Permanent(format!(
                        "provider returned {} vectors for {} inputs",
                        vectors.len(),
                        texts.len()
                    )));
                }
                return Ok(vectors);
            }
            Err(e) if e.is_transient() => last_err = Some(e),
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| EmbedError::Transient("embedding failed".to_string())))
}

/// Embed a single query text in the same vector space as ingestion.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    text: &str,
) -> Result<Vec<f32>, EmbedError> {
    let vectors = embed_with_retry(provider, config, &[text.to_string()]).await?;
    vectors
        .into_iter()
        .next()
        .ok_or_else(|| EmbedError::Permanent("empty embedding response".to_string()))
}

// ============ Ollama provider ============

/// Embedding provider backed by a local Ollama server (`POST /api/embed`).
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model,
            dims: config.dims.unwrap_or(0),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let resp = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbedError::Transient(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = format!("Ollama embed API error {}: {}", status, text);
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(EmbedError::Transient(message));
            }
            return Err(EmbedError::Permanent(message));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| EmbedError::Permanent(e.to_string()))?;
        parse_vectors(&json, "embeddings")
    }
}

fn parse_vectors(json: &serde_json::Value, key: &str) -> Result<Vec<Vec<f32>>, EmbedError> {
    let rows = json
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| EmbedError::Permanent(format!("missing {} array", key)))?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let values = row
            .as_array()
            .ok_or_else(|| EmbedError::Permanent("malformed embedding row".to_string()))?;
        out.push(
            values
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }
    Ok(out)
}

// ============ OpenAI provider ============

/// Embedding provider using the OpenAI API (`POST /v1/embeddings`).
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
            dims,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let resp = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbedError::Transient(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = format!("OpenAI API error {}: {}", status, text);
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(EmbedError::Transient(message));
            }
            return Err(EmbedError::Permanent(message));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| EmbedError::Permanent(e.to_string()))?;

        let data = json
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| EmbedError::Permanent("missing data array".to_string()))?;

        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            let embedding = item
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| EmbedError::Permanent("missing embedding".to_string()))?;
            vectors.push(
                embedding
                    .iter()
                    .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                    .collect(),
            );
        }

        Ok(vectors)
    }
}

// ============ Hash provider ============

/// Deterministic bag-of-words embedder.
///
/// Each lowercase alphanumeric token is hashed into a bucket with a sign
/// bit, and the resulting vector is L2-normalized. Texts sharing tokens
/// land near each other, which is enough for offline use and for
/// exercising the retrieval path in tests.
pub struct HashProvider {
    dims: usize,
}

impl HashProvider {
    pub fn new(dims: usize) -> Result<Self> {
        if dims == 0 {
            bail!("hash provider requires dims > 0");
        }
        Ok(Self { dims })
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dims];
        let lower = text.to_lowercase();
        for token in lower.split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let digest = Sha256::digest(token.as_bytes());
            let hash = u64::from_le_bytes(digest[..8].try_into().unwrap());
            let bucket = (hash % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vec[bucket] += sign;
        }

        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

// ============ Vector utilities ============

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`. Returns `0.0` for empty vectors or
/// mismatched lengths.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty_and_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_hash_provider_deterministic() {
        let provider = HashProvider::new(64).unwrap();
        let texts = vec!["the lynx discusses ingestion".to_string()];
        let a = provider.embed_batch(&texts).await.unwrap();
        let b = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 64);
    }

    #[tokio::test]
    async fn test_hash_provider_similarity_ordering() {
        let provider = HashProvider::new(128).unwrap();
        let texts = vec![
            "lynx discusses ingestion pipelines".to_string(),
            "what does the lynx discuss".to_string(),
            "completely unrelated walrus recipes".to_string(),
        ];
        let vectors = provider.embed_batch(&texts).await.unwrap();
        let close = cosine_similarity(&vectors[0], &vectors[1]);
        let far = cosine_similarity(&vectors[0], &vectors[2]);
        assert!(close > far);
    }

    #[tokio::test]
    async fn test_hash_provider_unit_norm() {
        let provider = HashProvider::new(32).unwrap();
        let vectors = provider
            .embed_batch(&["some text here".to_string()])
            .await
            .unwrap();
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hash_provider_rejects_zero_dims() {
        assert!(HashProvider::new(0).is_err());
    }

    #[test]
    fn test_create_provider_unknown() {
        let mut config = EmbeddingConfig::default();
        config.provider = "mystery".to_string();
        assert!(create_provider(&config).is_err());
    }

    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with a transient error a fixed number of times, then succeeds.
    struct FlakyProvider {
        remaining_failures: AtomicU32,
        attempts: AtomicU32,
    }

    impl FlakyProvider {
        fn new(failures: u32) -> Self {
            Self {
                remaining_failures: AtomicU32::new(failures),
                attempts: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        fn model_name(&self) -> &str {
            "flaky"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.remaining_failures.load(Ordering::SeqCst) > 0 {
                self.remaining_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(EmbedError::Transient("server overloaded".to_string()));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_after_transient_failures() {
        let provider = FlakyProvider::new(2);
        let config = EmbeddingConfig::default();

        let vectors = embed_with_retry(&provider, &config, &["x".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0]]);
        assert_eq!(provider.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_after_max_retries() {
        // More failures than the retry budget allows.
        let provider = FlakyProvider::new(100);
        let mut config = EmbeddingConfig::default();
        config.max_retries = 2;

        let err = embed_with_retry(&provider, &config, &["x".to_string()])
            .await
            .unwrap_err();
        assert!(err.is_transient());
        // Initial attempt plus max_retries retries.
        assert_eq!(provider.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_on_permanent() {
        struct AlwaysPermanent;

        #[async_trait]
        impl EmbeddingProvider for AlwaysPermanent {
            fn model_name(&self) -> &str {
                "broken"
            }
            fn dims(&self) -> usize {
                4
            }
            async fn embed_batch(&self, _: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
                Err(EmbedError::Permanent("bad input".to_string()))
            }
        }

        let config = EmbeddingConfig::default();
        let err = embed_with_retry(&AlwaysPermanent, &config, &["x".to_string()])
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }
}
