#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hsgmem::config::HsgConfig;
use hsgmem::db;
use hsgmem::embedding::synthetic::SyntheticProvider;
use hsgmem::embedding::EmbeddingProvider;
use hsgmem::memory::types::Sector;
use hsgmem::{HsgEngine, HsgError, Result};
use rusqlite::Connection;

pub const DIM: usize = 64;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_in_memory().unwrap()
}

/// Defaults with a small dimension and millisecond backoff.
pub fn test_config() -> HsgConfig {
    let mut config = HsgConfig::default();
    config.embedding.dimensions = DIM;
    config.embedding.retry_base_ms = 1;
    config.embedding.sector_delay_ms = 0;
    config
}

pub fn engine_with(provider: Arc<dyn EmbeddingProvider>) -> HsgEngine {
    HsgEngine::from_parts(test_db(), provider, test_config()).unwrap()
}

pub fn synthetic_engine() -> HsgEngine {
    engine_with(Arc::new(SyntheticProvider::new(DIM)))
}

/// Engine whose vectors reflect word overlap, so similar texts land close together.
pub fn keyword_engine() -> HsgEngine {
    engine_with(Arc::new(KeywordProvider))
}

/// Generate a deterministic embedding with a spike at position `seed`.
pub fn test_embedding(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[seed % DIM] = 1.0;
    v
}

pub async fn count_rows(engine: &HsgEngine, table: &'static str) -> i64 {
    engine
        .db()
        .call(move |conn| {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get::<_, i64>(0))?)
        })
        .await
        .unwrap()
}

pub async fn stored_salience(engine: &HsgEngine, id: &str) -> f64 {
    engine.get_memory(id).await.unwrap().memory.salience
}

// ── Stub providers ───────────────────────────────────────────────────────────

/// Bag-of-words hashing into `DIM` buckets, L2-normalized. Ignores the sector.
pub struct KeywordProvider;

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut h = DefaultHasher::new();
        word.to_lowercase().hash(&mut h);
        v[(h.finish() % DIM as u64) as usize] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    async fn embed(&self, text: &str, _sector: Sector) -> Result<Vec<f32>> {
        Ok(keyword_vector(text))
    }
}

/// Every call fails with a transient provider error.
#[derive(Default)]
pub struct OutageProvider {
    pub calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for OutageProvider {
    fn name(&self) -> &'static str {
        "outage"
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    async fn embed(&self, _text: &str, _sector: Sector) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(HsgError::Provider {
            provider: "outage".into(),
            message: "HTTP 503 Service Unavailable".into(),
            status: Some(503),
        })
    }
}

/// Returns a different vector length per sector, so the mean vector cannot be built.
pub struct MismatchedDimProvider;

#[async_trait]
impl EmbeddingProvider for MismatchedDimProvider {
    fn name(&self) -> &'static str {
        "mismatched"
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    async fn embed(&self, _text: &str, sector: Sector) -> Result<Vec<f32>> {
        Ok(vec![0.5; 2 + sector as usize])
    }
}
