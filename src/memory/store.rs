//! Write path: memory row, sector vectors, mean vector, and auto waypoint.
//!
//! [`store_memory`] runs the whole sequence inside one transaction. Embedding
//! happens before it is called, so the transaction never spans network I/O;
//! any failure drops the transaction and leaves no rows behind.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::tables;
use crate::embedding::calculate_mean_vector;
use crate::embedding::orchestrator::SectorEmbedding;
use crate::error::{HsgError, Result};
use crate::memory::sector::{initial_salience, sector_config, Classification};
use crate::memory::types::{Memory, Sector};
use crate::memory::waypoints;

/// Result returned from an add.
#[derive(Debug, Clone, Serialize)]
pub struct AddMemoryResult {
    pub id: String,
    pub primary_sector: Sector,
    /// Primary first, then additional sectors.
    pub sectors: Vec<Sector>,
    pub chunk_count: usize,
    /// Memory the automatic waypoint points to, if one was similar enough.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_to: Option<String>,
}

/// Read an explicit sector from caller metadata (`{"sector": "..."}`), if it names a known one.
pub fn explicit_sector(metadata: Option<&serde_json::Value>) -> Option<Sector> {
    metadata?
        .get("sector")?
        .as_str()
        .and_then(|s| s.parse().ok())
}

/// Build a fresh memory row from its classification.
pub fn new_memory(
    id: String,
    content: String,
    classification: &Classification,
    tags: Vec<String>,
    metadata: Option<serde_json::Value>,
    now: DateTime<Utc>,
) -> Memory {
    Memory {
        id,
        content,
        primary_sector: classification.primary,
        tags,
        metadata,
        created_at: now,
        updated_at: now,
        last_seen_at: now,
        salience: initial_salience(classification.additional.len()),
        decay_lambda: sector_config(classification.primary).decay_lambda,
        version: 1,
        mean_dim: None,
        mean_vec: None,
    }
}

/// Insert memory → insert vectors → store mean vector → single waypoint → commit.
///
/// Returns the memory the auto waypoint links to, if any.
pub fn store_memory(
    conn: &mut Connection,
    memory: &Memory,
    embeddings: &[SectorEmbedding],
    now: &DateTime<Utc>,
) -> Result<Option<String>> {
    if embeddings.is_empty() {
        return Err(HsgError::InvalidInput(format!(
            "memory {} has no sector embeddings",
            memory.id
        )));
    }

    let tx = conn.transaction()?;

    tables::insert_memory(&tx, memory)?;

    for e in embeddings {
        tables::insert_vector(&tx, &memory.id, e.sector, &e.vector)?;
    }

    let weighted: Vec<(Sector, Vec<f32>)> = embeddings
        .iter()
        .map(|e| (e.sector, e.vector.clone()))
        .collect();
    let mean = calculate_mean_vector(&weighted)?;
    tables::update_mean_vector(&tx, &memory.id, &mean)?;

    let linked = waypoints::create_single_waypoint(&tx, &memory.id, &mean, now)?;

    tx.commit()?;

    tracing::info!(
        id = %memory.id,
        sector = %memory.primary_sector,
        vectors = embeddings.len(),
        linked = linked.is_some(),
        "memory stored"
    );
    Ok(linked.map(|(id, _)| id))
}

/// Insert a memory that carries no vectors (e.g. a document root). Single statement.
pub fn store_bare_memory(conn: &Connection, memory: &Memory) -> Result<()> {
    tables::insert_memory(conn, memory)
}
