//! Local deterministic embedding provider.
//!
//! Implements [`EmbeddingProvider`] by expanding a SHA-256 digest of
//! `text + sector` into a unit-length vector. No network, no model download;
//! identical input always yields the identical vector.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{l2_normalize, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::Result;
use crate::memory::types::Sector;

pub struct LocalProvider {
    dim: usize,
}

impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Self {
        if let Some(path) = &config.local_model_path {
            tracing::info!(path = %path, "local provider uses digest embeddings; model path recorded only");
        }
        Self {
            dim: config.dimensions,
        }
    }
}

/// Expand `sha256(text + sector)` into `dim` values in `[-1, 1]`, then normalize.
///
/// Each 32-byte block feeds the next digest so long vectors do not repeat.
pub fn hash_embedding(text: &str, sector: Sector, dim: usize) -> Vec<f32> {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(sector.as_str().as_bytes());
    let mut block: [u8; 32] = hasher.finalize().into();

    let mut raw = Vec::with_capacity(dim);
    while raw.len() < dim {
        for i in 0..32 {
            if raw.len() == dim {
                break;
            }
            let hi = block[i] as f32;
            let lo = block[(i + 1) % 32] as f32;
            raw.push((hi * 256.0 + lo) / 65535.0 * 2.0 - 1.0);
        }
        block = Sha256::digest(block).into();
    }

    l2_normalize(&raw)
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str, sector: Sector) -> Result<Vec<f32>> {
        Ok(hash_embedding(text, sector, self.dim))
    }
}
