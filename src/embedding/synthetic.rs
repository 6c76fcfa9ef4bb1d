//! Synthetic embeddings: a pure function of text length and sector.
//!
//! Needs no network or model files, so it is the default provider and the
//! universal fallback. Vectors carry no semantic signal.

use async_trait::async_trait;

use super::{l2_normalize, EmbeddingProvider};
use crate::error::Result;
use crate::memory::types::Sector;

pub struct SyntheticProvider {
    dim: usize,
}

impl SyntheticProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

fn sector_seed(sector: Sector) -> f64 {
    match sector {
        Sector::Episodic => 0.13,
        Sector::Semantic => 0.17,
        Sector::Procedural => 0.19,
        Sector::Emotional => 0.23,
        Sector::Reflective => 0.29,
    }
}

/// Deterministic vector derived from `text.len()` and the sector.
pub fn synthetic_embedding(text: &str, sector: Sector, dim: usize) -> Vec<f32> {
    let len = text.chars().count() as f64;
    let phase = len * sector_seed(sector) + sector.as_str().len() as f64 * 0.11;
    let raw: Vec<f32> = (0..dim)
        .map(|i| ((i as f64 * 0.7 + phase).sin() % 1.0) as f32)
        .collect();
    l2_normalize(&raw)
}

#[async_trait]
impl EmbeddingProvider for SyntheticProvider {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn supports_batch(&self) -> bool {
        true
    }

    async fn embed(&self, text: &str, sector: Sector) -> Result<Vec<f32>> {
        Ok(synthetic_embedding(text, sector, self.dim))
    }
}
