mod helpers;

use std::sync::Arc;

use helpers::{count_rows, engine_with, synthetic_engine, OutageProvider};
use hsgmem::db::tables;
use hsgmem::memory::ingest::{IngestOptions, IngestStrategy};
use hsgmem::memory::types::Sector;

fn document(paragraphs: usize) -> String {
    (0..paragraphs)
        .map(|i| format!("Paragraph {i} describes one part of the quarterly plan in plain words."))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[tokio::test]
async fn small_document_is_a_single_memory() {
    let engine = synthetic_engine();
    let result = engine
        .ingest_text("A short note about the plan.", "txt", None, IngestOptions::default())
        .await
        .unwrap();

    assert_eq!(result.strategy, IngestStrategy::Single);
    assert!(result.child_ids.is_empty());

    let detail = engine.get_memory(&result.root_memory_id).await.unwrap();
    let meta = detail.memory.metadata.unwrap();
    assert_eq!(meta["ingestion_strategy"], "single");
    assert_eq!(count_rows(&engine, "memories").await, 1);
}

#[tokio::test]
async fn forced_root_child_links_every_section() {
    let engine = synthetic_engine();
    let text = document(6);
    let options = IngestOptions {
        force_root_child: true,
        section_size: Some(150),
        ..Default::default()
    };
    let result = engine
        .ingest_text(&text, "md", Some(serde_json::json!({"source": "plan.md"})), options)
        .await
        .unwrap();

    assert_eq!(result.strategy, IngestStrategy::RootChild);
    assert!(result.child_ids.len() >= 3);

    let root = engine.get_memory(&result.root_memory_id).await.unwrap();
    assert_eq!(root.memory.primary_sector, Sector::Reflective);
    assert_eq!(root.memory.salience, 1.0);
    assert!(root.sectors.is_empty());
    assert!(root.memory.content.starts_with("[Document: MD]"));
    let root_meta = root.memory.metadata.unwrap();
    assert_eq!(root_meta["is_root"], true);
    assert_eq!(root_meta["source"], "plan.md");

    for (i, child_id) in result.child_ids.iter().enumerate() {
        let child = engine.get_memory(child_id).await.unwrap();
        let meta = child.memory.metadata.unwrap();
        assert_eq!(meta["is_child"], true);
        assert_eq!(meta["section_index"], i);
        assert_eq!(meta["total_sections"], result.child_ids.len());
        assert_eq!(meta["parent_id"], result.root_memory_id.as_str());
        assert!(!child.sectors.is_empty());

        let edge = engine
            .db()
            .call({
                let (src, dst) = (result.root_memory_id.clone(), child_id.clone());
                move |conn| tables::get_waypoint(conn, &src, &dst)
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(edge.weight, 1.0);
    }
}

#[tokio::test]
async fn threshold_decides_the_strategy() {
    let engine = synthetic_engine();
    let text = document(4);
    let options = IngestOptions {
        large_doc_threshold: Some(10),
        section_size: Some(200),
        ..Default::default()
    };
    let result = engine.ingest_text(&text, "txt", None, options).await.unwrap();
    assert_eq!(result.strategy, IngestStrategy::RootChild);
    assert!(result.estimated_tokens > 10);
}

#[tokio::test]
async fn failed_ingest_removes_partial_document() {
    let engine = engine_with(Arc::new(OutageProvider::default()));
    let options = IngestOptions {
        force_root_child: true,
        section_size: Some(150),
        ..Default::default()
    };
    let err = engine
        .ingest_text(&document(4), "txt", None, options)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "embedding_failed");
    assert_eq!(count_rows(&engine, "memories").await, 0);
    assert_eq!(count_rows(&engine, "waypoints").await, 0);
}

#[tokio::test]
async fn blank_document_is_rejected() {
    let engine = synthetic_engine();
    let options = IngestOptions {
        force_root_child: true,
        ..Default::default()
    };
    let err = engine.ingest_text("\n\n \n\n", "txt", None, options).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_input");
}
