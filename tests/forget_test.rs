mod helpers;

use helpers::{count_rows, keyword_engine};

#[tokio::test]
async fn delete_removes_memory_vectors_and_waypoints() {
    let engine = keyword_engine();
    let a = engine
        .add_memory("the quick brown fox jumps", vec![], None)
        .await
        .unwrap();
    let b = engine
        .add_memory("the quick brown fox jumped", vec![], None)
        .await
        .unwrap();
    assert_eq!(b.linked_to.as_deref(), Some(a.id.as_str()));
    assert_eq!(count_rows(&engine, "waypoints").await, 1);

    let result = engine.delete_memory(&a.id).await.unwrap();
    assert_eq!(result.id, a.id);
    assert_eq!(result.vectors_removed, a.sectors.len());
    assert_eq!(result.waypoints_removed, 1);

    let err = engine.get_memory(&a.id).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(count_rows(&engine, "waypoints").await, 0);
    assert_eq!(count_rows(&engine, "vectors").await, b.sectors.len() as i64);

    engine.get_memory(&b.id).await.unwrap();
}

#[tokio::test]
async fn delete_unknown_id_is_not_found() {
    let engine = keyword_engine();
    let err = engine.delete_memory("nope").await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn list_is_newest_first_and_filterable() {
    let engine = keyword_engine();
    let first = engine.add_memory("I went to Paris yesterday", vec![], None).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = engine.add_memory("What is the definition of a monad", vec![], None).await.unwrap();

    let all = engine.list_memories(10, 0, None).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, second.id);
    assert_eq!(all[1].id, first.id);

    let episodic = engine
        .list_memories(10, 0, Some(first.primary_sector))
        .await
        .unwrap();
    assert_eq!(episodic.len(), 1);
    assert_eq!(episodic[0].id, first.id);

    let page = engine.list_memories(1, 1, None).await.unwrap();
    assert_eq!(page[0].id, first.id);
}

#[tokio::test]
async fn stats_reflect_store_contents() {
    let engine = keyword_engine();
    engine.add_memory("I went to Paris yesterday", vec![], None).await.unwrap();
    engine.add_memory("What is the definition of a monad", vec![], None).await.unwrap();

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.total_memories, 2);
    assert_eq!(stats.embed_logs["completed"], 2);
    assert!(stats.total_vectors >= 2);
}
