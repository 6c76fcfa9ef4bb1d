//! Hard deletion of a memory and everything hanging off it.
//!
//! Removes the memory row, its sector vectors, and every waypoint that starts
//! or ends at it (including edges to its synthetic `id:sector` nodes).

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::db::tables;
use crate::error::{HsgError, Result};
use crate::memory::types::Sector;
use crate::memory::waypoints::sector_node;

/// Result returned from a delete.
#[derive(Debug, Serialize)]
pub struct DeleteResult {
    pub id: String,
    pub vectors_removed: usize,
    pub waypoints_removed: usize,
}

/// Delete a memory by id in one transaction. Fails with not-found if absent.
pub fn delete_memory(conn: &mut Connection, memory_id: &str) -> Result<DeleteResult> {
    let tx = conn.transaction()?;

    let exists: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM memories WHERE id = ?1",
        params![memory_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(HsgError::NotFound(memory_id.to_string()));
    }

    let mut waypoints_removed = tables::delete_waypoints_touching(&tx, memory_id)?;
    for sector in Sector::ALL {
        waypoints_removed += tables::delete_waypoints_touching(&tx, &sector_node(memory_id, sector))?;
    }
    let vectors_removed = tables::delete_vectors(&tx, memory_id)?;
    tables::delete_memory(&tx, memory_id)?;

    tx.commit()?;

    tracing::info!(id = memory_id, vectors_removed, waypoints_removed, "memory deleted");
    Ok(DeleteResult {
        id: memory_id.to_string(),
        vectors_removed,
        waypoints_removed,
    })
}
