//! Store operations against an in-process Chroma server
//!
//! Covers collection handling, metadata flattening on the wire, query
//! thresholds and filters, namespace isolation, and corruption recovery.

use crate::common::*;
use forest_store::{
    ChromaProvider, ConnectionState, KnowledgeStore, MetadataFilter, MetadataValue, Namespace,
    QueryOptions, StoreError, VectorProvider,
};
use serde_json::json;

async fn open(mock: &MockChroma) -> KnowledgeStore {
    init_tracing();
    KnowledgeStore::open(chroma_config(&mock.url())).await.unwrap()
}

// ============================================================================
// Collections
// ============================================================================

#[tokio::test]
async fn initialize_is_idempotent() {
    let mock = MockChroma::start().await;
    let store = open(&mock).await;
    assert!(store.is_connected());
    assert_eq!(mock.requests("heartbeat"), 1);
    assert_eq!(mock.requests("create"), 1);

    let outcome = store.initialize().await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.collection, "forest_vectors");
    assert_eq!(mock.requests("heartbeat"), 1);
    assert_eq!(mock.requests("create"), 1);
    assert_eq!(mock.collection_names(), vec!["forest_vectors".to_string()]);
}

#[tokio::test]
async fn switching_collection_skips_heartbeat() {
    let mock = MockChroma::start().await;
    let store = open(&mock).await;

    store.use_collection("tree_two").await.unwrap();
    assert_eq!(mock.requests("heartbeat"), 1);
    assert_eq!(mock.requests("create"), 2);
    assert_eq!(store.get_status().collection, "tree_two");

    store.upsert("t:1", &[1.0, 0.0], &json!({})).await.unwrap();
    assert_eq!(mock.record_ids("tree_two"), vec!["t:1".to_string()]);
    assert!(mock.record_ids("forest_vectors").is_empty());

    let mut names = store.list_collections().await.unwrap();
    names.sort();
    assert_eq!(names, vec!["forest_vectors".to_string(), "tree_two".to_string()]);
}

// ============================================================================
// Records
// ============================================================================

#[tokio::test]
async fn metadata_is_flattened_on_the_wire() {
    let mock = MockChroma::start().await;
    let store = open(&mock).await;

    store
        .upsert(
            "tree:t1",
            &[1.0, 0.0],
            &json!({
                "title": "Learn scales",
                "tags": ["a", "b"],
                "done": false,
                "priority": 2,
                "note": null,
                "extra": {"k": 1}
            }),
        )
        .await
        .unwrap();

    let sent = mock.metadata_of("forest_vectors", "tree:t1").unwrap();
    assert_eq!(sent["title"], json!("Learn scales"));
    assert_eq!(sent["tags"], json!(r#"["a","b"]"#));
    assert_eq!(sent["done"], json!(false));
    assert_eq!(sent["priority"], json!(2));
    assert_eq!(sent["extra"], json!(r#"{"k":1}"#));
    assert!(!sent.contains_key("note"));

    let records = store.list(None).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].vector, vec![1.0, 0.0]);
    assert_eq!(records[0].metadata.get("priority"), Some(&MetadataValue::Int(2)));
}

#[tokio::test]
async fn query_applies_threshold_and_limit() {
    let mock = MockChroma::start().await;
    let store = open(&mock).await;

    store.upsert("p:near", &[1.0, 0.0], &json!({})).await.unwrap();
    store.upsert("p:mid", &[1.0, 1.0], &json!({})).await.unwrap();
    store.upsert("p:far", &[1.0, 0.1], &json!({})).await.unwrap();
    mock.force_distance("p:far", 0.95);

    let results = store.query(&[1.0, 0.0], &QueryOptions::new()).await.unwrap();
    let ids: Vec<&str> = results.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["p:near", "p:mid"]);
    assert!(results[0].similarity > 0.99);
    assert!(results[1].similarity < results[0].similarity);

    let one = store
        .query(&[1.0, 0.0], &QueryOptions::new().with_limit(1))
        .await
        .unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].id, "p:near");

    let none = store
        .query(&[1.0, 0.0], &QueryOptions::new().with_limit(0))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn query_filters_by_metadata() {
    let mock = MockChroma::start().await;
    let store = open(&mock).await;

    store
        .upsert("p:1", &[1.0, 0.0], &json!({"branch": "core", "level": 1}))
        .await
        .unwrap();
    store
        .upsert("p:2", &[1.0, 0.2], &json!({"branch": "docs", "level": 1}))
        .await
        .unwrap();
    store
        .upsert("p:3", &[1.0, 0.1], &json!({"branch": "docs", "level": 2}))
        .await
        .unwrap();

    let docs = QueryOptions::new().with_filter(MetadataFilter::new().eq("branch", "docs"));
    let ids: Vec<String> = store
        .query(&[1.0, 0.0], &docs)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ids, vec!["p:3".to_string(), "p:2".to_string()]);

    let both = QueryOptions::new().with_filter(
        MetadataFilter::new()
            .eq("branch", "docs")
            .eq("level", MetadataValue::Int(1)),
    );
    let results = store.query(&[1.0, 0.0], &both).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "p:2");
}

#[tokio::test]
async fn namespace_deletion_is_isolated() {
    let mock = MockChroma::start().await;
    let store = open(&mock).await;

    for id in ["a:1", "a:2", "ab:1", "b:1"] {
        store.upsert(id, &[1.0, 0.0], &json!({})).await.unwrap();
    }

    let removed = store
        .delete_namespace(&Namespace::for_owner("a").unwrap())
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(
        mock.record_ids("forest_vectors"),
        vec!["ab:1".to_string(), "b:1".to_string()]
    );

    let removed = store
        .delete_namespace(&Namespace::for_owner("missing").unwrap())
        .await
        .unwrap();
    assert_eq!(removed, 0);

    store.delete("b:1").await.unwrap();
    let remaining = store.list(Some("b:")).await.unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn provider_rejects_invalid_ids_before_sending() {
    init_tracing();
    let mock = MockChroma::start().await;
    let config = chroma_config(&mock.url());
    let provider = ChromaProvider::new(&config.chroma).unwrap();
    provider.initialize("c1").await.unwrap();

    let err = provider.delete_vector("").await.unwrap_err();
    assert!(err.is_validation_error());
    let err = provider
        .upsert_vector("", &[1.0], Default::default())
        .await
        .unwrap_err();
    assert!(err.is_validation_error());
    assert_eq!(mock.requests("delete"), 0);
    assert_eq!(mock.requests("upsert"), 0);
    assert!(provider.session().is_connected());
}

// ============================================================================
// Corruption and recovery
// ============================================================================

#[tokio::test]
async fn server_error_marks_provider_disconnected_until_reset() {
    init_tracing();
    let mock = MockChroma::start().await;
    let config = chroma_config(&mock.url());
    let provider = ChromaProvider::new(&config.chroma).unwrap();
    provider.initialize("c1").await.unwrap();
    let original_id = mock.collection_id("c1").unwrap();

    mock.fail_next("upsert", 500, "Internal Server Error");
    let err = provider
        .upsert_vector("p:1", &[1.0], Default::default())
        .await
        .unwrap_err();
    assert!(err.is_corruption());
    assert_eq!(provider.session().state(), ConnectionState::Disconnected);

    provider.session().set_reconnect_attempts(2);
    provider.reset_collection().await.unwrap();
    let snapshot = provider.session().snapshot();
    assert!(snapshot.is_connected);
    assert_eq!(snapshot.reconnect_attempts, 0);
    assert_ne!(mock.collection_id("c1").unwrap(), original_id);

    provider
        .upsert_vector("p:1", &[1.0], Default::default())
        .await
        .unwrap();
    assert_eq!(mock.record_ids("c1"), vec!["p:1".to_string()]);
}

#[tokio::test]
async fn store_recovers_from_corruption_and_retries() {
    let mock = MockChroma::start().await;
    let store = open(&mock).await;
    store.upsert("p:1", &[1.0, 0.0], &json!({})).await.unwrap();
    let original_id = mock.collection_id("forest_vectors").unwrap();

    mock.fail_next("upsert", 500, "Could not convert attribute 'title' to str");
    store.upsert("p:2", &[0.0, 1.0], &json!({})).await.unwrap();

    assert_eq!(mock.requests("delete_collection"), 1);
    assert_ne!(mock.collection_id("forest_vectors").unwrap(), original_id);
    assert_eq!(mock.record_ids("forest_vectors"), vec!["p:2".to_string()]);
    assert!(store.is_connected());

    let stats = store.recovery_stats();
    assert_eq!(stats.recoveries, 1);
    assert_eq!(stats.failures, 0);
    assert!(stats.last_recovery.is_some());
}

#[tokio::test]
async fn repeated_corruption_surfaces_after_one_retry() {
    let mock = MockChroma::start().await;
    let store = open(&mock).await;

    mock.fail_next("query", 500, "boom");
    mock.fail_next("query", 500, "boom");
    let err = store
        .query(&[1.0, 0.0], &QueryOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_corruption());
    assert!(!store.is_connected());
    assert_eq!(mock.requests("delete_collection"), 1);
    assert_eq!(mock.requests("query"), 2);
}

#[tokio::test]
async fn failed_reset_is_terminal() {
    let mock = MockChroma::start().await;
    let store = open(&mock).await;

    mock.fail_next("upsert", 500, "segment corrupt");
    mock.fail_next("delete_collection", 403, "forbidden");
    let err = store
        .upsert("p:1", &[1.0], &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Terminal { .. }));
    assert!(err.is_vector_unavailable());
    assert_eq!(store.recovery_stats().failures, 1);
}

#[tokio::test]
async fn reset_tolerates_missing_collection() {
    let mock = MockChroma::start().await;
    let store = open(&mock).await;
    store.upsert("p:1", &[1.0], &json!({})).await.unwrap();

    mock.fail_next(
        "delete_collection",
        404,
        "Collection forest_vectors does not exist.",
    );
    store.reset_collection().await.unwrap();
    assert!(store.is_connected());
    assert_eq!(store.recovery_stats().recoveries, 1);
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn failed_ping_disconnects_and_next_call_reconnects() {
    let mock = MockChroma::start().await;
    let store = open(&mock).await;

    mock.fail_next("heartbeat", 503, "unavailable");
    assert!(!store.ping().await);
    assert!(!store.is_connected());
    let check = store
        .get_status()
        .provider
        .session
        .last_health_check
        .unwrap();
    assert!(!check.healthy);

    store.list(None).await.unwrap();
    assert!(store.is_connected());
    assert_eq!(mock.requests("heartbeat"), 3);

    let health = store.get_health_status().await;
    assert!(health.healthy);
    assert!(health.provider_reachable);
    assert_eq!(health.reconnect_attempts, 0);
    assert!(health.lifecycle_state.is_none());
}

#[tokio::test]
async fn keep_alive_pings_until_close() {
    init_tracing();
    let mock = MockChroma::start().await;
    let mut config = chroma_config(&mock.url());
    config.chroma.keep_alive_ms = Some(20);
    let store = KnowledgeStore::open(config).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    assert!(mock.requests("heartbeat") > 2);
    assert!(store
        .get_status()
        .provider
        .session
        .last_health_check
        .is_some_and(|c| c.healthy));

    store.close().await.unwrap();
    let after_close = mock.requests("heartbeat");
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(mock.requests("heartbeat"), after_close);
}
