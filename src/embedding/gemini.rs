//! Gemini embeddings (`batchEmbedContents`).
//!
//! The API enforces a strict request rate, so every call from the whole process
//! goes through one [`SerialQueue`] with a cooldown between calls. Each queued
//! call retries with 429-aware backoff and, once attempts run out, degrades to
//! synthetic vectors so the add path keeps moving.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::queue::SerialQueue;
use super::synthetic::synthetic_embedding;
use super::{http_client, request_error, resize_vector, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::{HsgError, Result};
use crate::memory::types::Sector;

const MODEL: &str = "models/embedding-001";

pub struct GeminiProvider {
    inner: Arc<GeminiClient>,
    queue: SerialQueue,
}

struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    dim: usize,
    retry_base_ms: u64,
    max_attempts: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchRequest<'a> {
    pub requests: Vec<ContentRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContentRequest<'a> {
    pub model: &'static str,
    pub content: Content<'a>,
    pub task_type: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct Content<'a> {
    pub parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Part<'a> {
    pub text: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchResponse {
    #[serde(default)]
    pub embeddings: Vec<Values>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Values {
    pub values: Vec<f32>,
}

struct CallError {
    error: HsgError,
    retry_after_secs: Option<u64>,
}

pub fn task_type_for_sector(sector: Sector) -> &'static str {
    match sector {
        Sector::Episodic | Sector::Procedural => "RETRIEVAL_DOCUMENT",
        Sector::Semantic | Sector::Reflective => "SEMANTIC_SIMILARITY",
        Sector::Emotional => "CLASSIFICATION",
    }
}

pub(crate) fn build_request(items: &[(Sector, String)]) -> BatchRequest<'_> {
    BatchRequest {
        requests: items
            .iter()
            .map(|(sector, text)| ContentRequest {
                model: MODEL,
                content: Content {
                    parts: vec![Part { text: text.as_str() }],
                },
                task_type: task_type_for_sector(*sector),
            })
            .collect(),
    }
}

/// `base · 2^attempt`, capped by the server's `Retry-After` when one was sent.
pub fn backoff_delay(attempt: u32, base_ms: u64, retry_after_secs: Option<u64>) -> Duration {
    let exponential = base_ms.saturating_mul(1u64 << attempt.min(16));
    let ms = match retry_after_secs {
        Some(secs) => exponential.min(secs.saturating_mul(1000)),
        None => exponential,
    };
    Duration::from_millis(ms)
}

impl GeminiProvider {
    /// Fails with a configuration error when no API key is configured.
    /// Spawns the queue worker, so it must run inside a tokio runtime.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .gemini_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| HsgError::Config("Gemini provider requires GEMINI_API_KEY".into()))?;
        let inner = GeminiClient {
            client: http_client(config)?,
            api_key,
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            dim: config.dimensions,
            retry_base_ms: config.retry_base_ms,
            max_attempts: config.max_retries.max(1),
        };
        Ok(Self {
            inner: Arc::new(inner),
            queue: SerialQueue::new(Duration::from_millis(config.gemini_cooldown_ms)),
        })
    }
}

impl GeminiClient {
    async fn request(&self, items: &[(Sector, String)]) -> std::result::Result<Vec<Vec<f32>>, CallError> {
        let url = format!("{}/v1beta/models/embedding-001:batchEmbedContents", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request(items))
            .send()
            .await
            .map_err(|e| CallError {
                error: request_error("gemini", e),
                retry_after_secs: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(CallError {
                error: HsgError::Provider {
                    provider: "gemini".into(),
                    message: format!("HTTP {status}: {text}"),
                    status: Some(status.as_u16()),
                },
                retry_after_secs: if status.as_u16() == 429 { retry_after_secs } else { None },
            });
        }

        let parsed: BatchResponse = response.json().await.map_err(|e| CallError {
            error: request_error("gemini", e),
            retry_after_secs: None,
        })?;
        if parsed.embeddings.len() != items.len() {
            return Err(CallError {
                error: HsgError::provider(
                    "gemini",
                    format!("expected {} embeddings, got {}", items.len(), parsed.embeddings.len()),
                ),
                retry_after_secs: None,
            });
        }
        Ok(parsed
            .embeddings
            .into_iter()
            .map(|e| resize_vector(e.values, self.dim))
            .collect())
    }

    /// Retry with backoff; after the last attempt return synthetic vectors.
    async fn embed_with_fallback(&self, items: Vec<(Sector, String)>) -> Vec<Vec<f32>> {
        for attempt in 0..self.max_attempts {
            match self.request(&items).await {
                Ok(vectors) => return vectors,
                Err(failure) => {
                    let delay = backoff_delay(attempt, self.retry_base_ms, failure.retry_after_secs);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure.error,
                        "gemini embedding failed"
                    );
                    if attempt + 1 < self.max_attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        tracing::warn!(
            items = items.len(),
            "gemini retries exhausted, using synthetic embeddings"
        );
        items
            .iter()
            .map(|(sector, text)| synthetic_embedding(text, *sector, self.dim))
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn dimensions(&self) -> usize {
        self.inner.dim
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn is_serialized(&self) -> bool {
        true
    }

    async fn embed(&self, text: &str, sector: Sector) -> Result<Vec<f32>> {
        self.embed_batch(&[(sector, text.to_string())])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| HsgError::Internal("gemini returned no vector".into()))
    }

    async fn embed_batch(&self, items: &[(Sector, String)]) -> Result<Vec<Vec<f32>>> {
        let inner = Arc::clone(&self.inner);
        let items = items.to_vec();
        self.queue
            .submit(async move { inner.embed_with_fallback(items).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_types_per_sector() {
        assert_eq!(task_type_for_sector(Sector::Episodic), "RETRIEVAL_DOCUMENT");
        assert_eq!(task_type_for_sector(Sector::Procedural), "RETRIEVAL_DOCUMENT");
        assert_eq!(task_type_for_sector(Sector::Semantic), "SEMANTIC_SIMILARITY");
        assert_eq!(task_type_for_sector(Sector::Reflective), "SEMANTIC_SIMILARITY");
        assert_eq!(task_type_for_sector(Sector::Emotional), "CLASSIFICATION");
    }

    #[test]
    fn request_body_shape() {
        let items = vec![(Sector::Emotional, "so happy".to_string())];
        let json = serde_json::to_value(build_request(&items)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "requests": [{
                    "model": "models/embedding-001",
                    "content": {"parts": [{"text": "so happy"}]},
                    "taskType": "CLASSIFICATION"
                }]
            })
        );
    }

    #[test]
    fn backoff_honours_retry_after_cap() {
        assert_eq!(backoff_delay(0, 1000, None), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2, 1000, None), Duration::from_millis(4000));
        // a shorter Retry-After wins
        assert_eq!(backoff_delay(2, 1000, Some(1)), Duration::from_millis(1000));
        // a longer one is capped by the exponential delay
        assert_eq!(backoff_delay(1, 1000, Some(30)), Duration::from_millis(2000));
    }

    #[test]
    fn response_parses_values() {
        let parsed: BatchResponse =
            serde_json::from_str(r#"{"embeddings":[{"values":[0.1,0.2]}]}"#).unwrap();
        assert_eq!(parsed.embeddings[0].values, vec![0.1, 0.2]);
    }

    #[tokio::test]
    async fn new_without_key_is_config_error() {
        let err = GeminiProvider::new(&EmbeddingConfig::default()).err().unwrap();
        assert_eq!(err.kind(), "config");
    }

    #[tokio::test]
    async fn unreachable_endpoint_degrades_to_synthetic() {
        let config = EmbeddingConfig {
            gemini_api_key: Some("test-key".into()),
            gemini_base_url: "http://127.0.0.1:9".into(),
            gemini_cooldown_ms: 0,
            retry_base_ms: 1,
            timeout_secs: 2,
            dimensions: 16,
            ..Default::default()
        };
        let provider = GeminiProvider::new(&config).unwrap();
        assert!(provider.is_serialized());

        let items = vec![
            (Sector::Episodic, "I went to Paris".to_string()),
            (Sector::Semantic, "I went to Paris".to_string()),
        ];
        let vectors = provider.embed_batch(&items).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], synthetic_embedding("I went to Paris", Sector::Episodic, 16));
        assert_eq!(vectors[1], synthetic_embedding("I went to Paris", Sector::Semantic, 16));
    }
}
