//! Text embedding providers.
//!
//! `HttpEmbedder` talks to an OpenAI-compatible `/embeddings` endpoint.
//! `RetryingEmbedder` wraps any provider with exponential backoff — the
//! embedding gateway is the one external call the system retries.
//! `MockEmbedder` produces deterministic seeded-hash vectors for tests and
//! ephemeral mode.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Error type for embedding operations.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("empty input")]
    EmptyInput,
    #[error("embedding request failed: {0}")]
    RequestFailed(String),
    #[error("embedding retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// Trait for embedding providers: text → fixed-length vector.
pub trait EmbedProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Vector dimensionality every `embed` result has.
    fn dim(&self) -> usize;

    fn embed(
        &self,
        text: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, EmbedError>> + Send + '_>>;
}

// ── HTTP embedder ──

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Embedding provider over an OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbedder {
    model: String,
    dim: usize,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpEmbedder {
    pub fn new(model: String, dim: usize, api_key: String, base_url: String) -> Self {
        Self {
            model,
            dim,
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }

    async fn send(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if text.trim().is_empty() {
            return Err(EmbedError::EmptyInput);
        }

        let body = EmbeddingRequest {
            model: self.model.clone(),
            input: text.to_owned(),
        };

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbedError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(EmbedError::RequestFailed(format!("{status}: {text}")));
        }

        let api: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| EmbedError::RequestFailed(e.to_string()))?;

        api.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbedError::RequestFailed("empty embedding response".into()))
    }
}

impl EmbedProvider for HttpEmbedder {
    fn name(&self) -> &str {
        "http"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(
        &self,
        text: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, EmbedError>> + Send + '_>> {
        let text = text.to_owned();
        Box::pin(async move { self.send(&text).await })
    }
}

/// Build an HttpEmbedder from the environment.
/// Reads `FABLE_EMBED_MODEL`, `FABLE_LLM_API_KEY`, `FABLE_LLM_BASE_URL`,
/// optionally `FABLE_EMBED_DIM`. Returns `None` if model or key is unset.
pub fn from_env(default_dim: usize) -> Option<HttpEmbedder> {
    let model = std::env::var("FABLE_EMBED_MODEL").ok()?;
    let api_key = std::env::var("FABLE_LLM_API_KEY").ok()?;
    let base_url = std::env::var("FABLE_LLM_BASE_URL")
        .unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let dim = std::env::var("FABLE_EMBED_DIM")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default_dim);
    Some(HttpEmbedder::new(model, dim, api_key, base_url))
}

// ── Retry decorator ──

/// Retries a wrapped embedder with exponential backoff.
/// `EmptyInput` is not retried — it can never succeed.
pub struct RetryingEmbedder {
    inner: Arc<dyn EmbedProvider>,
    max_attempts: u32,
    backoff_base: Duration,
}

impl RetryingEmbedder {
    pub fn new(inner: Arc<dyn EmbedProvider>, max_attempts: u32, backoff_base: Duration) -> Self {
        Self { inner, max_attempts, backoff_base }
    }

    async fn embed_with_retry(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut last = String::new();
        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.backoff_base * 2u32.pow(attempt - 1)).await;
            }
            match self.inner.embed(text).await {
                Ok(v) => return Ok(v),
                Err(EmbedError::EmptyInput) => return Err(EmbedError::EmptyInput),
                Err(e) => {
                    last = e.to_string();
                    tracing::warn!(
                        provider = self.inner.name(),
                        attempt = attempt + 1,
                        error = %last,
                        "embedding attempt failed"
                    );
                }
            }
        }
        Err(EmbedError::RetriesExhausted { attempts: self.max_attempts, last })
    }
}

impl EmbedProvider for RetryingEmbedder {
    fn name(&self) -> &str {
        "retrying"
    }

    fn dim(&self) -> usize {
        self.inner.dim()
    }

    fn embed(
        &self,
        text: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, EmbedError>> + Send + '_>> {
        let text = text.to_owned();
        Box::pin(async move { self.embed_with_retry(&text).await })
    }
}

// ── Mock embedder ──

/// Deterministic embedder: hashes the text under one seed per dimension.
/// Same input always yields the same vector; different inputs yield
/// uncorrelated vectors. Tests that need controlled similarity can register
/// explicit vectors per text, and texts can be marked as failing to exercise
/// gateway-failure paths.
pub struct MockEmbedder {
    dim: usize,
    overrides: HashMap<String, Vec<f32>>,
    fail_texts: Vec<String>,
}

impl MockEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, overrides: HashMap::new(), fail_texts: Vec::new() }
    }

    /// Register a fixed vector for a specific text.
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        assert_eq!(vector.len(), self.dim, "override vector dimension mismatch");
        self.overrides.insert(text.into(), vector);
        self
    }

    /// Mark a text whose embedding always fails.
    pub fn failing_on(mut self, text: impl Into<String>) -> Self {
        self.fail_texts.push(text.into());
        self
    }

    fn generate(&self, text: &str) -> Vec<f32> {
        let mut embedding = Vec::with_capacity(self.dim);
        for seed in 0..self.dim {
            let mut hasher = DefaultHasher::new();
            seed.hash(&mut hasher);
            text.hash(&mut hasher);
            embedding.push((hasher.finish() % 1000) as f32 / 1000.0);
        }
        embedding
    }
}

impl EmbedProvider for MockEmbedder {
    fn name(&self) -> &str {
        "mock"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(
        &self,
        text: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, EmbedError>> + Send + '_>> {
        let result = if text.trim().is_empty() {
            Err(EmbedError::EmptyInput)
        } else if self.fail_texts.iter().any(|t| t == text) {
            Err(EmbedError::RequestFailed("mock failure".into()))
        } else if let Some(v) = self.overrides.get(text) {
            Ok(v.clone())
        } else {
            Ok(self.generate(text))
        };
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn mock_is_deterministic() {
        let m = MockEmbedder::new(32);
        let a = m.embed("hello world").await.unwrap();
        let b = m.embed("hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[tokio::test]
    async fn mock_different_inputs_differ() {
        let m = MockEmbedder::new(32);
        let a = m.embed("hello").await.unwrap();
        let b = m.embed("world").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn mock_empty_input_fails() {
        let m = MockEmbedder::new(8);
        assert!(matches!(m.embed("  ").await, Err(EmbedError::EmptyInput)));
    }

    #[tokio::test]
    async fn mock_override_wins() {
        let m = MockEmbedder::new(2).with_vector("pinned", vec![1.0, 0.0]);
        assert_eq!(m.embed("pinned").await.unwrap(), vec![1.0, 0.0]);
    }

    /// Fails `fail_count` times, then succeeds.
    struct FlakyEmbedder {
        calls: AtomicU32,
        fail_count: u32,
    }

    impl EmbedProvider for FlakyEmbedder {
        fn name(&self) -> &str {
            "flaky"
        }

        fn dim(&self) -> usize {
            2
        }

        fn embed(
            &self,
            _text: &str,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, EmbedError>> + Send + '_>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let result = if n < self.fail_count {
                Err(EmbedError::RequestFailed("transient".into()))
            } else {
                Ok(vec![0.5, 0.5])
            };
            Box::pin(async move { result })
        }
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failures() {
        let flaky = Arc::new(FlakyEmbedder { calls: AtomicU32::new(0), fail_count: 2 });
        let retrying = RetryingEmbedder::new(flaky, 3, Duration::from_millis(1));
        let v = retrying.embed("text").await.unwrap();
        assert_eq!(v, vec![0.5, 0.5]);
    }

    #[tokio::test]
    async fn retry_exhaustion_propagates() {
        let flaky = Arc::new(FlakyEmbedder { calls: AtomicU32::new(0), fail_count: 10 });
        let retrying = RetryingEmbedder::new(flaky, 3, Duration::from_millis(1));
        match retrying.embed("text").await {
            Err(EmbedError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn retry_does_not_retry_empty_input() {
        let m = Arc::new(MockEmbedder::new(4));
        let retrying = RetryingEmbedder::new(m, 3, Duration::from_millis(1));
        assert!(matches!(retrying.embed("").await, Err(EmbedError::EmptyInput)));
    }
}
