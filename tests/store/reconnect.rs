//! Bounded reconnect behaviour

use crate::common::*;
use forest_store::{KnowledgeStore, QueryOptions, StoreError};
use serde_json::json;

#[tokio::test]
async fn unreachable_server_exhausts_reconnects() {
    init_tracing();
    let url = format!("http://127.0.0.1:{}", free_port());
    let store = KnowledgeStore::open(chroma_config(&url)).await.unwrap();
    assert!(!store.is_connected());

    for attempt in 1..=3 {
        let err = store.list(None).await.unwrap_err();
        assert!(err.is_connectivity(), "attempt {}: {:?}", attempt, err);
        assert_eq!(store.get_health_status().await.reconnect_attempts, attempt);
    }

    let err = store.list(None).await.unwrap_err();
    assert!(matches!(err, StoreError::MaxRetriesExceeded { attempts: 3, max: 3 }));
    assert!(err.is_vector_unavailable());
}

#[tokio::test]
async fn exhausted_counter_makes_no_requests() {
    init_tracing();
    let mock = MockChroma::start().await;
    let store = KnowledgeStore::open(chroma_config(&mock.url())).await.unwrap();

    let session = store.provider().session();
    session.mark_disconnected();
    session.set_reconnect_attempts(3);
    let heartbeats = mock.requests("heartbeat");

    let err = store
        .query(&[1.0, 0.0], &QueryOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::MaxRetriesExceeded { .. }));
    assert_eq!(mock.requests("heartbeat"), heartbeats);
    assert_eq!(mock.requests("query"), 0);

    store.reset_reconnect_attempts();
    store.upsert("p:1", &[1.0, 0.0], &json!({})).await.unwrap();
    assert!(store.is_connected());
    assert_eq!(mock.requests("heartbeat"), heartbeats + 1);
}

#[tokio::test]
async fn server_coming_back_resets_the_counter() {
    init_tracing();
    let mock = MockChroma::start().await;
    let store = KnowledgeStore::open(chroma_config(&mock.url())).await.unwrap();

    store.provider().session().mark_disconnected();
    mock.fail_next("heartbeat", 503, "starting up");
    mock.fail_next("heartbeat", 503, "starting up");

    assert!(store.list(None).await.is_err());
    assert!(store.list(None).await.is_err());
    assert_eq!(store.provider().session().reconnect_attempts(), 2);

    store.list(None).await.unwrap();
    assert!(store.is_connected());
    assert_eq!(store.provider().session().reconnect_attempts(), 0);
}
