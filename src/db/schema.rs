//! SQL DDL for the memory store.
//!
//! Defines the `memories`, `vectors`, `waypoints`, `embed_logs`, and `schema_meta`
//! tables. All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- One row per memory; mean_vec is the sector-weighted centroid of its vectors
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    primary_sector TEXT NOT NULL CHECK(primary_sector IN ('episodic','semantic','procedural','emotional','reflective')),
    tags TEXT NOT NULL DEFAULT '[]',
    metadata TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    salience REAL NOT NULL CHECK(salience >= 0.0 AND salience <= 1.0),
    decay_lambda REAL NOT NULL CHECK(decay_lambda > 0.0),
    version INTEGER NOT NULL DEFAULT 1,
    mean_dim INTEGER,
    mean_vec BLOB
);

CREATE INDEX IF NOT EXISTS idx_memories_sector_created ON memories(primary_sector, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at);

-- Per-sector embeddings, little-endian f32
CREATE TABLE IF NOT EXISTS vectors (
    id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    sector TEXT NOT NULL,
    v BLOB NOT NULL,
    dim INTEGER NOT NULL,
    PRIMARY KEY (id, sector)
);

CREATE INDEX IF NOT EXISTS idx_vectors_sector ON vectors(sector);

-- Associative graph. dst_id may name a synthetic `id:sector` node, so no FK.
CREATE TABLE IF NOT EXISTS waypoints (
    src_id TEXT NOT NULL,
    dst_id TEXT NOT NULL,
    weight REAL NOT NULL CHECK(weight >= 0.0 AND weight <= 1.0),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (src_id, dst_id)
);

CREATE INDEX IF NOT EXISTS idx_waypoints_dst ON waypoints(dst_id);

-- Embedding audit trail; rows are never deleted
CREATE TABLE IF NOT EXISTS embed_logs (
    id TEXT PRIMARY KEY,
    model TEXT NOT NULL,
    status TEXT NOT NULL CHECK(status IN ('pending','completed','failed')),
    ts TEXT NOT NULL,
    err TEXT
);

CREATE INDEX IF NOT EXISTS idx_embed_logs_status ON embed_logs(status);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
