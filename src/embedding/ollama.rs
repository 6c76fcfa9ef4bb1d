//! Ollama embeddings (`POST /api/embeddings`), one text per call.
//!
//! Model is chosen per sector; responses are truncated or zero-padded to the
//! configured dimension.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{http_client, request_error, resize_vector, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::{HsgError, Result};
use crate::memory::types::Sector;

pub struct OllamaProvider {
    client: reqwest::Client,
    url: String,
    dim: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct EmbedRequest<'a> {
    pub model: &'static str,
    pub prompt: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmbedResponse {
    pub embedding: Vec<f32>,
}

pub fn model_for_sector(sector: Sector) -> &'static str {
    match sector {
        Sector::Procedural => "bge-small",
        Sector::Reflective => "bge-large",
        _ => "nomic-embed-text",
    }
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            url: config.ollama_url.trim_end_matches('/').to_string(),
            dim: config.dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str, sector: Sector) -> Result<Vec<f32>> {
        let body = EmbedRequest {
            model: model_for_sector(sector),
            prompt: text,
        };
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error("ollama", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HsgError::Provider {
                provider: "ollama".into(),
                message: format!("HTTP {status}: {text}"),
                status: Some(status.as_u16()),
            });
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| request_error("ollama", e))?;
        Ok(resize_vector(parsed.embedding, self.dim))
    }
}
