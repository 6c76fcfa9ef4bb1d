use std::collections::BTreeMap;

use rusqlite::Connection;
use serde::Serialize;

use crate::error::Result;
use crate::memory::types::{EmbedStatus, Sector};

/// Per-sector breakdown in [`StatsResponse`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct SectorStats {
    pub count: u64,
    pub avg_salience: f64,
}

/// Response from memory_stats.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_memories: u64,
    /// Keyed by primary sector; every sector is present, even when empty.
    pub by_sector: BTreeMap<Sector, SectorStats>,
    pub total_vectors: u64,
    pub total_waypoints: u64,
    pub embed_logs: BTreeMap<String, u64>,
}

/// Compute memory store statistics.
pub fn memory_stats(conn: &Connection) -> Result<StatsResponse> {
    let by_sector = sector_breakdown(conn)?;
    let total_memories = by_sector.values().map(|s| s.count).sum();

    Ok(StatsResponse {
        total_memories,
        by_sector,
        total_vectors: count(conn, "SELECT COUNT(*) FROM vectors")?,
        total_waypoints: count(conn, "SELECT COUNT(*) FROM waypoints")?,
        embed_logs: embed_log_counts(conn)?,
    })
}

fn count(conn: &Connection, sql: &str) -> Result<u64> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(n as u64)
}

fn sector_breakdown(conn: &Connection) -> Result<BTreeMap<Sector, SectorStats>> {
    let mut out: BTreeMap<Sector, SectorStats> =
        Sector::ALL.iter().map(|s| (*s, SectorStats::default())).collect();

    let mut stmt = conn.prepare(
        "SELECT primary_sector, COUNT(*), AVG(salience) FROM memories GROUP BY primary_sector",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, f64>(2)?,
        ))
    })?;
    for row in rows {
        let (sector, n, avg) = row?;
        if let Ok(sector) = sector.parse::<Sector>() {
            out.insert(
                sector,
                SectorStats {
                    count: n as u64,
                    avg_salience: avg,
                },
            );
        }
    }
    Ok(out)
}

fn embed_log_counts(conn: &Connection) -> Result<BTreeMap<String, u64>> {
    let mut out: BTreeMap<String, u64> = [EmbedStatus::Pending, EmbedStatus::Completed, EmbedStatus::Failed]
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();

    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM embed_logs GROUP BY status")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    for row in rows {
        let (status, n) = row?;
        out.insert(status, n as u64);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tables;
    use crate::memory::sector::classify_content;
    use crate::memory::store::new_memory;
    use chrono::Utc;

    fn test_db() -> Connection {
        crate::db::open_in_memory().unwrap()
    }

    #[test]
    fn test_stats_empty_db() {
        let conn = test_db();
        let stats = memory_stats(&conn).unwrap();
        assert_eq!(stats.total_memories, 0);
        assert_eq!(stats.by_sector.len(), 5);
        assert_eq!(stats.by_sector[&Sector::Semantic].count, 0);
        assert_eq!(stats.embed_logs["pending"], 0);
    }

    #[test]
    fn test_stats_counts_everything() {
        let conn = test_db();
        let now = Utc::now();
        for (id, text) in [("a", "yesterday"), ("b", "yesterday again"), ("c", "zzz")] {
            let c = classify_content(text, None);
            let m = new_memory(id.into(), text.into(), &c, vec![], None, now);
            tables::insert_memory(&conn, &m).unwrap();
            tables::insert_vector(&conn, id, c.primary, &[1.0, 0.0]).unwrap();
        }
        tables::upsert_waypoint(&conn, "a", "b", 0.8, &now).unwrap();
        tables::insert_embed_log(&conn, "a", "synthetic", &now).unwrap();
        tables::finish_embed_log(&conn, "a", EmbedStatus::Completed, None).unwrap();

        let stats = memory_stats(&conn).unwrap();
        assert_eq!(stats.total_memories, 3);
        assert_eq!(stats.by_sector[&Sector::Episodic].count, 2);
        assert!((stats.by_sector[&Sector::Episodic].avg_salience - 0.4).abs() < 1e-9);
        assert_eq!(stats.by_sector[&Sector::Semantic].count, 1);
        assert_eq!(stats.total_vectors, 3);
        assert_eq!(stats.total_waypoints, 1);
        assert_eq!(stats.embed_logs["completed"], 1);
        assert_eq!(stats.embed_logs["failed"], 0);
    }
}
