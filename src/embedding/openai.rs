//! OpenAI embeddings (`POST /v1/embeddings`).
//!
//! Batch-capable; picks a model per sector and asks the API to truncate to the
//! configured dimension.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{http_client, request_error, resize_vector, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::{HsgError, Result};
use crate::memory::types::Sector;

const SMALL_MODEL: &str = "text-embedding-3-small";
const LARGE_MODEL: &str = "text-embedding-3-large";
/// Native width of the small model; larger requests need the large model.
const SMALL_MODEL_MAX_DIM: usize = 1536;

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    dim: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct EmbeddingRequest<'a> {
    pub input: EmbeddingInput<'a>,
    pub model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum EmbeddingInput<'a> {
    One(&'a str),
    Many(Vec<&'a str>),
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmbeddingResponse {
    pub data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmbeddingData {
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub index: usize,
}

/// Reflective content gets the larger model; everything else the small one.
pub fn model_for_sector(sector: Sector) -> &'static str {
    match sector {
        Sector::Reflective => LARGE_MODEL,
        _ => SMALL_MODEL,
    }
}

impl OpenAiProvider {
    /// Fails with a configuration error when no API key is configured.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| HsgError::Config("OpenAI provider requires OPENAI_API_KEY".into()))?;
        Ok(Self {
            client: http_client(config)?,
            api_key,
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            dim: config.dimensions,
        })
    }

    fn dimensions_param(&self, model: &str) -> Option<usize> {
        (model == LARGE_MODEL || self.dim <= SMALL_MODEL_MAX_DIM).then_some(self.dim)
    }

    async fn post(&self, body: &EmbeddingRequest<'_>) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| request_error("openai", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HsgError::Provider {
                provider: "openai".into(),
                message: format!("HTTP {status}: {text}"),
                status: Some(status.as_u16()),
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| request_error("openai", e))?;
        Ok(ordered_embeddings(parsed)
            .into_iter()
            .map(|v| resize_vector(v, self.dim))
            .collect())
    }
}

/// Sort response rows by their `index` so output matches input order.
pub(crate) fn ordered_embeddings(mut response: EmbeddingResponse) -> Vec<Vec<f32>> {
    response.data.sort_by_key(|d| d.index);
    response.data.into_iter().map(|d| d.embedding).collect()
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn supports_batch(&self) -> bool {
        true
    }

    async fn embed(&self, text: &str, sector: Sector) -> Result<Vec<f32>> {
        let model = model_for_sector(sector);
        let body = EmbeddingRequest {
            input: EmbeddingInput::One(text),
            model,
            dimensions: self.dimensions_param(model),
        };
        self.post(&body)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| HsgError::provider("openai", "response contained no embeddings"))
    }

    /// One request for all items, always on the small model.
    async fn embed_batch(&self, items: &[(Sector, String)]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            input: EmbeddingInput::Many(items.iter().map(|(_, t)| t.as_str()).collect()),
            model: SMALL_MODEL,
            dimensions: self.dimensions_param(SMALL_MODEL),
        };
        let vectors = self.post(&body).await?;
        if vectors.len() != items.len() {
            return Err(HsgError::provider(
                "openai",
                format!("expected {} embeddings, got {}", items.len(), vectors.len()),
            ));
        }
        Ok(vectors)
    }
}
