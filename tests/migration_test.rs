mod helpers;

use std::sync::Arc;

use hsgmem::db;
use hsgmem::db::migrations::{
    get_embedding_fingerprint, get_schema_version, run_migrations, set_embedding_fingerprint,
    CURRENT_SCHEMA_VERSION,
};
use hsgmem::embedding::synthetic::SyntheticProvider;
use hsgmem::HsgEngine;

#[test]
fn fresh_db_migrates_to_current_version() {
    let conn = helpers::test_db();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn migrations_are_idempotent() {
    let mut conn = helpers::test_db();
    run_migrations(&mut conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn manual_v1_db_upgrades_correctly() {
    let mut conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), 1);

    run_migrations(&mut conn).unwrap();

    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    let has_index: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_waypoints_src_weight'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(has_index, 1);
}

#[tokio::test]
async fn engine_records_embedding_fingerprint_once() {
    let conn = helpers::test_db();
    assert!(get_embedding_fingerprint(&conn).unwrap().is_none());
    let engine = HsgEngine::from_parts(
        conn,
        Arc::new(SyntheticProvider::new(helpers::DIM)),
        helpers::test_config(),
    )
    .unwrap();
    assert_eq!(
        stored_fingerprint(&engine).await.as_deref(),
        Some(format!("synthetic/{}", helpers::DIM).as_str())
    );

    let conn = helpers::test_db();
    set_embedding_fingerprint(&conn, "openai/1536").unwrap();
    // a mismatch is only a warning; the stored value is left alone
    let engine = HsgEngine::from_parts(
        conn,
        Arc::new(SyntheticProvider::new(helpers::DIM)),
        helpers::test_config(),
    )
    .unwrap();
    assert_eq!(stored_fingerprint(&engine).await.as_deref(), Some("openai/1536"));
}

async fn stored_fingerprint(engine: &HsgEngine) -> Option<String> {
    engine
        .db()
        .call(|conn| Ok(get_embedding_fingerprint(conn)?))
        .await
        .unwrap()
}
