//! Per-sector text embedding.
//!
//! Provides the [`EmbeddingProvider`] capability trait and five interchangeable
//! backends, selected once at startup via [`create_provider`]. The
//! [`orchestrator`] layers retry, batching, chunk aggregation and audit logging
//! on top of whichever provider is active.

pub mod gemini;
pub mod local;
pub mod ollama;
pub mod openai;
pub mod orchestrator;
pub mod queue;
pub mod synthetic;

use async_trait::async_trait;
use std::time::Duration;

use crate::config::{EmbeddingConfig, ProviderKind};
use crate::error::{HsgError, Result};
use crate::memory::sector::sector_config;
use crate::memory::types::Sector;

/// Trait for embedding text into vectors, one sector at a time.
///
/// Implementations return vectors of exactly [`dimensions`](Self::dimensions) floats.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short provider name recorded in audit logs.
    fn name(&self) -> &'static str;

    fn dimensions(&self) -> usize;

    /// Whether [`embed_batch`](Self::embed_batch) maps to a single backend call.
    fn supports_batch(&self) -> bool {
        false
    }

    /// Whether every call must go through one process-wide ordered queue.
    fn is_serialized(&self) -> bool {
        false
    }

    async fn embed(&self, text: &str, sector: Sector) -> Result<Vec<f32>>;

    /// Embed several (sector, text) pairs. Output order matches input order.
    async fn embed_batch(&self, items: &[(Sector, String)]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(items.len());
        for (sector, text) in items {
            out.push(self.embed(text, *sector).await?);
        }
        Ok(out)
    }
}

/// Create the configured embedding provider.
///
/// A remote provider whose credential is missing degrades to the synthetic
/// provider with a warning instead of failing startup.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    let fallback = |reason: &str| -> Result<Box<dyn EmbeddingProvider>> {
        tracing::warn!(
            provider = config.provider.as_str(),
            reason,
            "falling back to synthetic embeddings"
        );
        Ok(Box::new(synthetic::SyntheticProvider::new(config.dimensions)))
    };

    let provider: Box<dyn EmbeddingProvider> = match config.provider {
        ProviderKind::OpenAi => {
            if config.openai_api_key.as_deref().unwrap_or("").is_empty() {
                return fallback("OPENAI_API_KEY is not set");
            }
            Box::new(openai::OpenAiProvider::new(config)?)
        }
        ProviderKind::Gemini => {
            if config.gemini_api_key.as_deref().unwrap_or("").is_empty() {
                return fallback("GEMINI_API_KEY is not set");
            }
            Box::new(gemini::GeminiProvider::new(config)?)
        }
        ProviderKind::Ollama => Box::new(ollama::OllamaProvider::new(config)?),
        ProviderKind::Local => Box::new(local::LocalProvider::new(config)),
        ProviderKind::Synthetic => Box::new(synthetic::SyntheticProvider::new(config.dimensions)),
    };

    tracing::info!(
        provider = provider.name(),
        dimensions = provider.dimensions(),
        "embedding provider ready"
    );
    Ok(provider)
}

/// Shared HTTP client for the remote providers, bounded by the configured timeout.
pub(crate) fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .build()
        .map_err(|e| HsgError::Config(format!("failed to build HTTP client: {e}")))
}

/// Map a reqwest failure to a transient provider error.
pub(crate) fn request_error(provider: &str, err: reqwest::Error) -> HsgError {
    HsgError::Provider {
        provider: provider.to_string(),
        message: err.to_string(),
        status: err.status().map(|s| s.as_u16()),
    }
}

/// Truncate or zero-pad `v` to exactly `dim` entries.
pub fn resize_vector(mut v: Vec<f32>, dim: usize) -> Vec<f32> {
    v.resize(dim, 0.0);
    v
}

/// Scale to unit length; zero vectors pass through unchanged.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

/// Sector-weighted centroid of a memory's per-sector vectors.
pub fn calculate_mean_vector(vectors: &[(Sector, Vec<f32>)]) -> Result<Vec<f32>> {
    let (_, first) = vectors
        .first()
        .ok_or_else(|| HsgError::InvalidInput("no sector vectors for mean".into()))?;
    let dim = first.len();
    let mut acc = vec![0.0f64; dim];
    let mut total_weight = 0.0f64;

    for (sector, v) in vectors {
        if v.len() != dim {
            return Err(HsgError::InvalidInput(format!(
                "sector {sector} vector has dimension {}, expected {dim}",
                v.len()
            )));
        }
        let weight = sector_config(*sector).weight;
        total_weight += weight;
        for (a, x) in acc.iter_mut().zip(v) {
            *a += *x as f64 * weight;
        }
    }

    Ok(acc.into_iter().map(|x| (x / total_weight) as f32).collect())
}
