//! Multi-sector embedding on top of a single [`EmbeddingProvider`].
//!
//! [`EmbeddingOrchestrator::embed_multi_sector`] owns the audit log row, the
//! retry loop with exponential backoff, and the choice between one batched call
//! ("simple" mode) and per-sector calls with chunk aggregation ("advanced").

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use super::EmbeddingProvider;
use crate::config::{EmbedMode, EmbeddingConfig};
use crate::db::{tables, Db};
use crate::error::{HsgError, Result};
use crate::memory::chunking::{aggregate_vectors, Chunk};
use crate::memory::types::{EmbedStatus, Sector};

/// One embedded sector of a memory.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorEmbedding {
    pub sector: Sector,
    pub vector: Vec<f32>,
    pub dim: usize,
}

/// Snapshot of the active embedding setup.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingInfo {
    pub provider: String,
    pub dimensions: usize,
    pub mode: String,
    /// True when simple mode is active and the provider can batch.
    pub batch_mode: bool,
    pub parallel: bool,
    pub serialized: bool,
    pub sector_delay_ms: u64,
    pub max_retries: u32,
}

pub struct EmbeddingOrchestrator {
    provider: Arc<dyn EmbeddingProvider>,
    mode: EmbedMode,
    parallel: bool,
    sector_delay: Duration,
    max_attempts: u32,
    retry_base_ms: u64,
}

impl EmbeddingOrchestrator {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self {
            provider,
            mode: config.mode,
            parallel: config.parallel,
            sector_delay: Duration::from_millis(config.sector_delay_ms),
            max_attempts: config.max_retries.max(1),
            retry_base_ms: config.retry_base_ms,
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn info(&self) -> EmbeddingInfo {
        EmbeddingInfo {
            provider: self.provider.name().to_string(),
            dimensions: self.provider.dimensions(),
            mode: self.mode.as_str().to_string(),
            batch_mode: self.uses_batch(),
            parallel: self.parallel && !self.provider.is_serialized(),
            serialized: self.provider.is_serialized(),
            sector_delay_ms: self.sector_delay.as_millis() as u64,
            max_retries: self.max_attempts,
        }
    }

    fn uses_batch(&self) -> bool {
        self.mode == EmbedMode::Simple && self.provider.supports_batch()
    }

    /// Embed `text` for one sector with no retry or audit row. Used for queries.
    pub async fn embed_for_sector(&self, text: &str, sector: Sector) -> Result<Vec<f32>> {
        self.provider.embed(text, sector).await
    }

    /// Embed `text` for every sector in `sectors`, recording an audit row under `id`.
    ///
    /// Transient provider failures are retried with `base · 2^attempt` backoff;
    /// configuration errors fail immediately.
    pub async fn embed_multi_sector(
        &self,
        db: &Db,
        id: &str,
        text: &str,
        sectors: &[Sector],
        chunks: Option<&[Chunk]>,
    ) -> Result<Vec<SectorEmbedding>> {
        let log_id = id.to_string();
        let model = self.provider.name().to_string();
        db.call(move |conn| tables::insert_embed_log(conn, &log_id, &model, &Utc::now()))
            .await?;

        let mut last_error = None;
        for attempt in 0..self.max_attempts {
            match self.embed_once(text, sectors, chunks).await {
                Ok(embeddings) => {
                    self.finish_log(db, id, EmbedStatus::Completed, None).await?;
                    tracing::debug!(id, sectors = embeddings.len(), "multi-sector embedding complete");
                    return Ok(embeddings);
                }
                Err(e) if !e.is_retryable() => {
                    self.finish_log(db, id, EmbedStatus::Failed, Some(e.to_string()))
                        .await?;
                    return Err(e);
                }
                Err(e) => {
                    let delay = Duration::from_millis(
                        self.retry_base_ms.saturating_mul(1u64 << attempt.min(16)),
                    );
                    tracing::warn!(
                        id,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "embedding attempt failed"
                    );
                    last_error = Some(e);
                    if attempt + 1 < self.max_attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".into());
        self.finish_log(db, id, EmbedStatus::Failed, Some(message.clone()))
            .await?;
        Err(HsgError::EmbeddingExhausted {
            attempts: self.max_attempts,
            message,
        })
    }

    async fn finish_log(
        &self,
        db: &Db,
        id: &str,
        status: EmbedStatus,
        err: Option<String>,
    ) -> Result<()> {
        let id = id.to_string();
        db.call(move |conn| tables::finish_embed_log(conn, &id, status, err.as_deref()))
            .await?;
        Ok(())
    }

    async fn embed_once(
        &self,
        text: &str,
        sectors: &[Sector],
        chunks: Option<&[Chunk]>,
    ) -> Result<Vec<SectorEmbedding>> {
        let dim = self.provider.dimensions();

        if self.uses_batch() {
            let items: Vec<(Sector, String)> =
                sectors.iter().map(|s| (*s, text.to_string())).collect();
            let vectors = self.provider.embed_batch(&items).await?;
            if vectors.len() != sectors.len() {
                return Err(HsgError::provider(
                    self.provider.name(),
                    format!("batch returned {} vectors for {} sectors", vectors.len(), sectors.len()),
                ));
            }
            return Ok(sectors
                .iter()
                .zip(vectors)
                .map(|(sector, vector)| SectorEmbedding {
                    sector: *sector,
                    dim: vector.len(),
                    vector,
                })
                .collect());
        }

        let chunks = chunks.filter(|c| c.len() > 1);

        if self.parallel && !self.provider.is_serialized() {
            let calls = sectors
                .iter()
                .map(|sector| self.embed_sector(text, *sector, chunks));
            return futures::future::try_join_all(calls).await;
        }

        let mut out = Vec::with_capacity(sectors.len());
        for (i, sector) in sectors.iter().enumerate() {
            out.push(self.embed_sector(text, *sector, chunks).await?);
            if i + 1 < sectors.len() && !self.sector_delay.is_zero() {
                tokio::time::sleep(self.sector_delay).await;
            }
        }
        tracing::trace!(dim, sectors = out.len(), "sequential sector embedding done");
        Ok(out)
    }

    /// One sector: embed the text, or every chunk and mean-pool them.
    async fn embed_sector(
        &self,
        text: &str,
        sector: Sector,
        chunks: Option<&[Chunk]>,
    ) -> Result<SectorEmbedding> {
        let vector = match chunks {
            Some(chunks) => {
                let mut pieces = Vec::with_capacity(chunks.len());
                for chunk in chunks {
                    pieces.push(self.provider.embed(&chunk.text, sector).await?);
                }
                aggregate_vectors(&pieces)?
            }
            None => self.provider.embed(text, sector).await?,
        };
        Ok(SectorEmbedding {
            sector,
            dim: vector.len(),
            vector,
        })
    }
}
