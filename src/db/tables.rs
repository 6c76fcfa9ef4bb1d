//! Row-level operations over the store tables.
//!
//! Every function takes a plain `&Connection`; a `Transaction` derefs to one, so
//! callers choose the transaction boundary. Timestamps are RFC 3339 text with
//! millisecond precision, vectors are little-endian `f32` blobs.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::memory::types::{EmbedLog, EmbedStatus, Memory, Sector, VectorRow, Waypoint};
use crate::memory::vector::{decode_vector, encode_vector};

// ── Column helpers ───────────────────────────────────────────────────────────

pub fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn conversion_err(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn sector_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Sector> {
    let raw: String = row.get(idx)?;
    raw.parse::<Sector>()
        .map_err(|e| conversion_err(idx, std::io::Error::other(e)))
}

fn vector_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<f32>> {
    let raw: Vec<u8> = row.get(idx)?;
    decode_vector(&raw).map_err(|e| conversion_err(idx, e))
}

fn json_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| serde_json::from_str(&s).map_err(|e| conversion_err(idx, e)))
        .transpose()
}

// ── Memories ─────────────────────────────────────────────────────────────────

const MEMORY_COLUMNS: &str = "id, content, primary_sector, tags, metadata, created_at, updated_at, \
     last_seen_at, salience, decay_lambda, version, mean_dim, mean_vec";

fn memory_from_row(row: &Row<'_>) -> rusqlite::Result<Memory> {
    let tags: Vec<String> = json_col(row, 3)?
        .map(|v| serde_json::from_value(v).map_err(|e| conversion_err(3, e)))
        .transpose()?
        .unwrap_or_default();
    Ok(Memory {
        id: row.get(0)?,
        content: row.get(1)?,
        primary_sector: sector_col(row, 2)?,
        tags,
        metadata: json_col(row, 4)?,
        created_at: ts_col(row, 5)?,
        updated_at: ts_col(row, 6)?,
        last_seen_at: ts_col(row, 7)?,
        salience: row.get(8)?,
        decay_lambda: row.get(9)?,
        version: row.get(10)?,
        mean_dim: row.get::<_, Option<i64>>(11)?.map(|d| d as usize),
        mean_vec: row.get(12)?,
    })
}

pub fn insert_memory(conn: &Connection, m: &Memory) -> Result<()> {
    let tags = serde_json::to_string(&m.tags)?;
    let metadata = m.metadata.as_ref().map(serde_json::to_string).transpose()?;
    conn.execute(
        "INSERT INTO memories (id, content, primary_sector, tags, metadata, created_at, updated_at, \
         last_seen_at, salience, decay_lambda, version, mean_dim, mean_vec) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            m.id,
            m.content,
            m.primary_sector.as_str(),
            tags,
            metadata,
            fmt_ts(&m.created_at),
            fmt_ts(&m.updated_at),
            fmt_ts(&m.last_seen_at),
            m.salience,
            m.decay_lambda,
            m.version,
            m.mean_dim.map(|d| d as i64),
            m.mean_vec,
        ],
    )?;
    Ok(())
}

pub fn get_memory(conn: &Connection, id: &str) -> Result<Option<Memory>> {
    let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], memory_from_row).optional()?)
}

/// Newest first, optionally restricted to one primary sector.
pub fn list_memories(
    conn: &Connection,
    limit: usize,
    offset: usize,
    sector: Option<Sector>,
) -> Result<Vec<Memory>> {
    let sql = format!(
        "SELECT {MEMORY_COLUMNS} FROM memories WHERE (?1 IS NULL OR primary_sector = ?1) \
         ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![sector.map(|s| s.as_str()), limit as i64, offset as i64],
            memory_from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn all_memories(conn: &Connection) -> Result<Vec<Memory>> {
    let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], memory_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Ids and decoded mean vectors of every memory that has one.
pub fn memories_with_mean(conn: &Connection) -> Result<Vec<(String, Vec<f32>)>> {
    let mut stmt =
        conn.prepare("SELECT id, mean_vec FROM memories WHERE mean_vec IS NOT NULL")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, vector_col(row, 1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Record an access: refresh `last_seen_at`/`updated_at` and set salience.
pub fn update_seen(
    conn: &Connection,
    id: &str,
    salience: f64,
    now: &DateTime<Utc>,
) -> Result<usize> {
    let ts = fmt_ts(now);
    Ok(conn.execute(
        "UPDATE memories SET salience = ?1, last_seen_at = ?2, updated_at = ?2 WHERE id = ?3",
        params![salience, ts, id],
    )?)
}

/// Persist a decayed salience; leaves `last_seen_at` untouched.
pub fn update_salience(
    conn: &Connection,
    id: &str,
    salience: f64,
    now: &DateTime<Utc>,
) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE memories SET salience = ?1, updated_at = ?2 WHERE id = ?3",
        params![salience, fmt_ts(now), id],
    )?)
}

pub fn update_mean_vector(conn: &Connection, id: &str, mean: &[f32]) -> Result<()> {
    conn.execute(
        "UPDATE memories SET mean_dim = ?1, mean_vec = ?2 WHERE id = ?3",
        params![mean.len() as i64, encode_vector(mean), id],
    )?;
    Ok(())
}

pub fn delete_memory(conn: &Connection, id: &str) -> Result<usize> {
    Ok(conn.execute("DELETE FROM memories WHERE id = ?1", [id])?)
}

// ── Vectors ──────────────────────────────────────────────────────────────────

pub fn insert_vector(conn: &Connection, id: &str, sector: Sector, v: &[f32]) -> Result<()> {
    conn.execute(
        "INSERT INTO vectors (id, sector, v, dim) VALUES (?1, ?2, ?3, ?4)",
        params![id, sector.as_str(), encode_vector(v), v.len() as i64],
    )?;
    Ok(())
}

fn vector_from_row(row: &Row<'_>) -> rusqlite::Result<VectorRow> {
    Ok(VectorRow {
        id: row.get(0)?,
        sector: sector_col(row, 1)?,
        vector: vector_col(row, 2)?,
        dim: row.get::<_, i64>(3)? as usize,
    })
}

pub fn vectors_by_sector(conn: &Connection, sector: Sector) -> Result<Vec<VectorRow>> {
    let mut stmt = conn.prepare("SELECT id, sector, v, dim FROM vectors WHERE sector = ?1")?;
    let rows = stmt
        .query_map([sector.as_str()], vector_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn vectors_by_memory(conn: &Connection, id: &str) -> Result<Vec<VectorRow>> {
    let mut stmt =
        conn.prepare("SELECT id, sector, v, dim FROM vectors WHERE id = ?1 ORDER BY sector")?;
    let rows = stmt
        .query_map([id], vector_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn delete_vectors(conn: &Connection, id: &str) -> Result<usize> {
    Ok(conn.execute("DELETE FROM vectors WHERE id = ?1", [id])?)
}

// ── Waypoints ────────────────────────────────────────────────────────────────

fn waypoint_from_row(row: &Row<'_>) -> rusqlite::Result<Waypoint> {
    Ok(Waypoint {
        src_id: row.get(0)?,
        dst_id: row.get(1)?,
        weight: row.get(2)?,
        created_at: ts_col(row, 3)?,
        updated_at: ts_col(row, 4)?,
    })
}

/// Insert the edge, or overwrite its weight keeping the original `created_at`.
pub fn upsert_waypoint(
    conn: &Connection,
    src: &str,
    dst: &str,
    weight: f64,
    now: &DateTime<Utc>,
) -> Result<()> {
    let ts = fmt_ts(now);
    conn.execute(
        "INSERT INTO waypoints (src_id, dst_id, weight, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?4) \
         ON CONFLICT(src_id, dst_id) DO UPDATE SET weight = excluded.weight, updated_at = excluded.updated_at",
        params![src, dst, weight.clamp(0.0, 1.0), ts],
    )?;
    Ok(())
}

pub fn get_waypoint(conn: &Connection, src: &str, dst: &str) -> Result<Option<Waypoint>> {
    Ok(conn
        .query_row(
            "SELECT src_id, dst_id, weight, created_at, updated_at FROM waypoints \
             WHERE src_id = ?1 AND dst_id = ?2",
            [src, dst],
            waypoint_from_row,
        )
        .optional()?)
}

pub fn update_waypoint_weight(
    conn: &Connection,
    src: &str,
    dst: &str,
    weight: f64,
    now: &DateTime<Utc>,
) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE waypoints SET weight = ?1, updated_at = ?2 WHERE src_id = ?3 AND dst_id = ?4",
        params![weight.clamp(0.0, 1.0), fmt_ts(now), src, dst],
    )?)
}

/// Outgoing edges of `src`, strongest first.
pub fn outgoing_waypoints(conn: &Connection, src: &str) -> Result<Vec<Waypoint>> {
    let mut stmt = conn.prepare(
        "SELECT src_id, dst_id, weight, created_at, updated_at FROM waypoints \
         WHERE src_id = ?1 ORDER BY weight DESC",
    )?;
    let rows = stmt
        .query_map([src], waypoint_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Remove every edge that starts or ends at `id`.
pub fn delete_waypoints_touching(conn: &Connection, id: &str) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM waypoints WHERE src_id = ?1 OR dst_id = ?1",
        [id],
    )?)
}

pub fn delete_waypoints_below(conn: &Connection, threshold: f64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM waypoints WHERE weight < ?1", [threshold])?)
}

// ── Embed logs ───────────────────────────────────────────────────────────────

pub fn insert_embed_log(
    conn: &Connection,
    id: &str,
    model: &str,
    now: &DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO embed_logs (id, model, status, ts, err) VALUES (?1, ?2, 'pending', ?3, NULL)",
        params![id, model, fmt_ts(now)],
    )?;
    Ok(())
}

/// Move a pending log to its terminal status. Already-terminal rows are left alone.
pub fn finish_embed_log(
    conn: &Connection,
    id: &str,
    status: EmbedStatus,
    err: Option<&str>,
) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE embed_logs SET status = ?1, err = ?2 WHERE id = ?3 AND status = 'pending'",
        params![status.as_str(), err, id],
    )?)
}

pub fn embed_logs_by_status(conn: &Connection, status: EmbedStatus) -> Result<Vec<EmbedLog>> {
    let mut stmt = conn.prepare(
        "SELECT id, model, status, ts, err FROM embed_logs WHERE status = ?1 ORDER BY ts DESC",
    )?;
    let rows = stmt
        .query_map([status.as_str()], |row| {
            let status: String = row.get(2)?;
            Ok(EmbedLog {
                id: row.get(0)?,
                model: row.get(1)?,
                status: status
                    .parse()
                    .map_err(|e: String| conversion_err(2, std::io::Error::other(e)))?,
                ts: ts_col(row, 3)?,
                err: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_db() -> Connection {
        crate::db::open_in_memory().unwrap()
    }

    fn memory(id: &str, sector: Sector, created_at: DateTime<Utc>) -> Memory {
        Memory {
            id: id.into(),
            content: format!("content of {id}"),
            primary_sector: sector,
            tags: vec!["t1".into()],
            metadata: Some(serde_json::json!({"source": "test"})),
            created_at,
            updated_at: created_at,
            last_seen_at: created_at,
            salience: 0.5,
            decay_lambda: 0.005,
            version: 1,
            mean_dim: None,
            mean_vec: None,
        }
    }

    #[test]
    fn memory_round_trips_through_row() {
        let conn = test_db();
        let now = Utc::now();
        insert_memory(&conn, &memory("m1", Sector::Emotional, now)).unwrap();

        let m = get_memory(&conn, "m1").unwrap().unwrap();
        assert_eq!(m.primary_sector, Sector::Emotional);
        assert_eq!(m.tags, vec!["t1".to_string()]);
        assert_eq!(m.metadata, Some(serde_json::json!({"source": "test"})));
        assert_eq!(fmt_ts(&m.created_at), fmt_ts(&now));
        assert_eq!(m.version, 1);
        assert!(get_memory(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn list_is_newest_first_and_filters_sector() {
        let conn = test_db();
        let t0 = Utc::now();
        insert_memory(&conn, &memory("old", Sector::Semantic, t0 - Duration::hours(2))).unwrap();
        insert_memory(&conn, &memory("mid", Sector::Episodic, t0 - Duration::hours(1))).unwrap();
        insert_memory(&conn, &memory("new", Sector::Semantic, t0)).unwrap();

        let ids: Vec<String> = list_memories(&conn, 10, 0, None)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);

        let semantic = list_memories(&conn, 10, 0, Some(Sector::Semantic)).unwrap();
        assert_eq!(semantic.len(), 2);
        let episodic = list_memories(&conn, 10, 0, Some(Sector::Episodic)).unwrap();
        assert_eq!(episodic.len(), 1);
        assert_eq!(episodic[0].id, "mid");
        assert!(list_memories(&conn, 10, 0, Some(Sector::Reflective)).unwrap().is_empty());

        let page = list_memories(&conn, 1, 1, None).unwrap();
        assert_eq!(page[0].id, "mid");
    }

    #[test]
    fn vectors_are_keyed_by_memory_and_sector() {
        let conn = test_db();
        insert_memory(&conn, &memory("m1", Sector::Semantic, Utc::now())).unwrap();
        insert_vector(&conn, "m1", Sector::Semantic, &[1.0, 0.0]).unwrap();
        insert_vector(&conn, "m1", Sector::Reflective, &[0.0, 1.0]).unwrap();
        assert!(insert_vector(&conn, "m1", Sector::Semantic, &[0.5, 0.5]).is_err());

        let by_sector = vectors_by_sector(&conn, Sector::Reflective).unwrap();
        assert_eq!(by_sector.len(), 1);
        assert_eq!(by_sector[0].vector, vec![0.0, 1.0]);
        assert_eq!(by_sector[0].dim, 2);

        assert_eq!(vectors_by_memory(&conn, "m1").unwrap().len(), 2);
    }

    #[test]
    fn upsert_waypoint_preserves_created_at() {
        let conn = test_db();
        let t0 = Utc::now() - Duration::days(1);
        let t1 = Utc::now();
        upsert_waypoint(&conn, "a", "b", 0.4, &t0).unwrap();
        upsert_waypoint(&conn, "a", "b", 0.9, &t1).unwrap();

        let wp = get_waypoint(&conn, "a", "b").unwrap().unwrap();
        assert_eq!(wp.weight, 0.9);
        assert_eq!(fmt_ts(&wp.created_at), fmt_ts(&t0));
        assert_eq!(fmt_ts(&wp.updated_at), fmt_ts(&t1));
    }

    #[test]
    fn outgoing_waypoints_sorted_by_weight() {
        let conn = test_db();
        let now = Utc::now();
        upsert_waypoint(&conn, "a", "b", 0.2, &now).unwrap();
        upsert_waypoint(&conn, "a", "c", 0.8, &now).unwrap();
        upsert_waypoint(&conn, "a", "d", 0.5, &now).unwrap();
        upsert_waypoint(&conn, "x", "a", 0.9, &now).unwrap();

        let dsts: Vec<String> = outgoing_waypoints(&conn, "a")
            .unwrap()
            .into_iter()
            .map(|w| w.dst_id)
            .collect();
        assert_eq!(dsts, vec!["c", "d", "b"]);

        assert_eq!(delete_waypoints_touching(&conn, "a").unwrap(), 4);
    }

    #[test]
    fn embed_log_transitions_once() {
        let conn = test_db();
        insert_embed_log(&conn, "m1", "synthetic", &Utc::now()).unwrap();
        assert_eq!(embed_logs_by_status(&conn, EmbedStatus::Pending).unwrap().len(), 1);

        assert_eq!(finish_embed_log(&conn, "m1", EmbedStatus::Failed, Some("boom")).unwrap(), 1);
        assert_eq!(finish_embed_log(&conn, "m1", EmbedStatus::Completed, None).unwrap(), 0);

        let failed = embed_logs_by_status(&conn, EmbedStatus::Failed).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].err.as_deref(), Some("boom"));
    }
}
