//! Embedding client
//!
//! Wraps a provider with batching, retry with exponential backoff for
//! transient failures, and a minimum inter-call spacing to respect
//! provider rate limits. Unavailability (no key, no model) is decided
//! without a network call.

use super::traits::EmbeddingProvider;
use crate::error::{LodestoneError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Texts per provider call
pub const EMBED_BATCH_SIZE: usize = 32;

/// Minimum spacing between provider calls
const MIN_CALL_SPACING: Duration = Duration::from_millis(50);

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 250;

/// Batching, retrying front-end over an [`EmbeddingProvider`]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    model: String,
    api_key_present: bool,
    last_call: Mutex<Option<Instant>>,
}

impl EmbeddingClient {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, model: &str, api_key_present: bool) -> Self {
        Self {
            provider,
            model: model.to_string(),
            api_key_present,
            last_call: Mutex::new(None),
        }
    }

    /// Whether the vector path can run at all
    pub fn is_available(&self) -> bool {
        self.api_key_present && !self.model.trim().is_empty()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed a single query text
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        vectors
            .pop()
            .ok_or_else(|| LodestoneError::Llm("provider returned no embedding".into()))
    }

    /// Embed texts in provider-sized batches
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if !self.is_available() {
            return Err(LodestoneError::EmbeddingUnavailable(
                "missing api key or embedding model".into(),
            ));
        }
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            self.pace().await;
            let vectors = self.call_with_retry(batch).await?;
            if vectors.len() != batch.len() {
                return Err(LodestoneError::Llm(format!(
                    "provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            let dims = vectors.first().map(|v| v.len()).unwrap_or(0);
            if dims == 0 || vectors.iter().any(|v| v.len() != dims) {
                return Err(LodestoneError::Llm(
                    "provider returned vectors of unequal dimension".into(),
                ));
            }
            all.extend(vectors);
        }
        Ok(all)
    }

    async fn pace(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < MIN_CALL_SPACING {
                tokio::time::sleep(MIN_CALL_SPACING - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn call_with_retry(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.provider.embed_batch(&self.model, batch).await {
                Ok(vectors) => return Ok(vectors),
                Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                    let delay = Duration::from_millis(BACKOFF_BASE_MS * (1 << (attempt - 1)));
                    tracing::warn!(
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "transient embedding failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// OpenAI-compatible HTTP embeddings provider
pub struct HttpEmbeddingProvider {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpEmbeddingProvider {
    pub fn new(base_url: &str, api_key: Option<String>, timeout_secs: u64) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_batch(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let mut req = self.http_client.post(&url).json(&EmbedRequest {
            model,
            input: texts,
        });

        if let Some(ref api_key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Auth and unknown-model failures are permanent
            if status.as_u16() == 401 || status.as_u16() == 403 || status.as_u16() == 404 {
                return Err(LodestoneError::EmbeddingUnavailable(format!(
                    "embedding service rejected request (HTTP {}): {}",
                    status, body
                )));
            }
            return Err(LodestoneError::Llm(format!(
                "embedding service error (HTTP {}): {}",
                status, body
            )));
        }

        let mut parsed: EmbedResponse = response.json().await?;
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed_batch(&self, _model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(LodestoneError::Timeout("simulated".into()));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_unavailable_without_key() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        });
        let client = EmbeddingClient::new(provider.clone(), "model", false);
        assert!(!client.is_available());
        let err = client.embed_batch(&["a".to_string()]).await.unwrap_err();
        assert!(matches!(err, LodestoneError::EmbeddingUnavailable(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unavailable_without_model() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        });
        let client = EmbeddingClient::new(provider, "  ", true);
        assert!(!client.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_retried() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail_first: 2,
        });
        let client = EmbeddingClient::new(provider.clone(), "model", true);
        let vectors = client.embed_batch(&["a".to_string()]).await.unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_surfaces_error() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail_first: 10,
        });
        let client = EmbeddingClient::new(provider.clone(), "model", true);
        let err = client.embed_batch(&["a".to_string()]).await.unwrap_err();
        assert!(matches!(err, LodestoneError::Timeout(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batching_splits_large_inputs() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        });
        let client = EmbeddingClient::new(provider.clone(), "model", true);
        let texts: Vec<String> = (0..70).map(|i| format!("text {}", i)).collect();
        let vectors = client.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 70);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }
}
