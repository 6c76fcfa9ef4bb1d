mod helpers;

use std::sync::Arc;

use hsgmem::db;
use hsgmem::db::migrations::get_embedding_fingerprint;
use hsgmem::embedding::synthetic::SyntheticProvider;
use hsgmem::memory::search::QueryFilters;
use hsgmem::HsgEngine;
use tempfile::TempDir;

#[test]
fn open_creates_new_db_at_nonexistent_path() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("subdir").join("new.db");

    assert!(!db_path.exists());

    let conn = db::open_database(&db_path).unwrap();

    assert!(db_path.exists());

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn busy_timeout_is_set() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("test.db");

    let conn = db::open_database(&db_path).unwrap();

    let timeout: i64 = conn
        .pragma_query_value(None, "busy_timeout", |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 5000);
}

#[test]
fn wal_mode_is_enabled() {
    let tmp = TempDir::new().unwrap();
    let conn = db::open_database(tmp.path().join("wal.db")).unwrap();
    let mode: String = conn
        .pragma_query_value(None, "journal_mode", |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}

#[tokio::test]
async fn memories_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("hsg.db");

    let id = {
        let conn = db::open_database(&db_path).unwrap();
        let engine = HsgEngine::from_parts(
            conn,
            Arc::new(SyntheticProvider::new(helpers::DIM)),
            helpers::test_config(),
        )
        .unwrap();
        engine
            .add_memory("I went to Paris yesterday", vec![], None)
            .await
            .unwrap()
            .id
    };

    let conn = db::open_database(&db_path).unwrap();
    assert_eq!(
        get_embedding_fingerprint(&conn).unwrap().as_deref(),
        Some(format!("synthetic/{}", helpers::DIM).as_str())
    );
    let engine = HsgEngine::from_parts(
        conn,
        Arc::new(SyntheticProvider::new(helpers::DIM)),
        helpers::test_config(),
    )
    .unwrap();

    let detail = engine.get_memory(&id).await.unwrap();
    assert_eq!(detail.memory.content, "I went to Paris yesterday");
    let results = engine
        .query("Paris trip", Some(3), QueryFilters::default())
        .await
        .unwrap();
    assert_eq!(results[0].id, id);
}

#[tokio::test]
async fn concurrent_adds_and_queries_interleave_safely() {
    let engine = helpers::synthetic_engine();
    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .add_memory(&format!("I went to Paris yesterday, trip {i}"), vec![], None)
                .await
                .unwrap();
            engine
                .query("Paris", Some(3), QueryFilters::default())
                .await
                .unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    assert_eq!(helpers::count_rows(&engine, "memories").await, 8);
}
