//! Fault-injecting provider for engine unit tests

use async_trait::async_trait;
use forest_core::{
    Metadata, Namespace, QueryMatch, QueryOptions, Record, StoreError, StoreResult,
};
use forest_provider::{
    InitializeOutcome, LocalProvider, ProviderMode, SessionState, VectorProvider,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use std::sync::Arc;

/// Wraps a [`LocalProvider`] and fails scheduled operations with backend
/// errors that go through normal classification.
pub(crate) struct FaultyProvider {
    inner: LocalProvider,
    faults: Mutex<HashMap<&'static str, Vec<(String, Option<u16>)>>>,
    pub initialize_calls: AtomicU32,
    pub reset_calls: AtomicU32,
    pub fail_reset: AtomicBool,
    /// Hold query results this long before returning them
    pub query_delay_ms: AtomicU64,
}

impl FaultyProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: LocalProvider::in_memory(),
            faults: Mutex::new(HashMap::new()),
            initialize_calls: AtomicU32::new(0),
            reset_calls: AtomicU32::new(0),
            fail_reset: AtomicBool::new(false),
            query_delay_ms: AtomicU64::new(0),
        })
    }

    /// Fail the next call of `operation` with `message`/`status`
    pub fn fail_next(&self, operation: &'static str, message: &str, status: Option<u16>) {
        self.faults
            .lock()
            .entry(operation)
            .or_default()
            .push((message.to_string(), status));
    }

    fn injected(&self, operation: &'static str) -> StoreResult<()> {
        let fault = {
            let mut faults = self.faults.lock();
            faults
                .get_mut(operation)
                .filter(|queue| !queue.is_empty())
                .map(|queue| queue.remove(0))
        };
        match fault {
            Some((message, status)) => {
                let err = StoreError::from_backend(operation, message, status);
                self.inner.session().observe(operation, Err(err))
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl VectorProvider for FaultyProvider {
    fn name(&self) -> &str {
        "faulty"
    }

    fn mode(&self) -> ProviderMode {
        ProviderMode::Memory
    }

    fn session(&self) -> &Arc<SessionState> {
        self.inner.session()
    }

    async fn initialize(&self, collection: &str) -> StoreResult<InitializeOutcome> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        if let Err(err) = self.injected("initialize") {
            self.session().mark_disconnected();
            return Err(err);
        }
        self.inner.initialize(collection).await
    }

    async fn upsert_vector(
        &self,
        id: &str,
        vector: &[f32],
        metadata: Metadata,
    ) -> StoreResult<()> {
        self.injected("upsert")?;
        self.inner.upsert_vector(id, vector, metadata).await
    }

    async fn query_vectors(
        &self,
        query: &[f32],
        options: &QueryOptions,
    ) -> StoreResult<Vec<QueryMatch>> {
        self.injected("query")?;
        let results = self.inner.query_vectors(query, options).await;
        let delay = self.query_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        results
    }

    async fn delete_vector(&self, id: &str) -> StoreResult<()> {
        self.injected("delete")?;
        self.inner.delete_vector(id).await
    }

    async fn delete_namespace(&self, namespace: &Namespace) -> StoreResult<usize> {
        self.injected("delete_namespace")?;
        self.inner.delete_namespace(namespace).await
    }

    async fn list_vectors(&self, prefix: Option<&str>) -> StoreResult<Vec<Record>> {
        self.injected("list")?;
        self.inner.list_vectors(prefix).await
    }

    async fn ping(&self) -> bool {
        if self.injected("ping").is_err() {
            self.session().record_health_check(false, Some("injected".to_string()));
            return false;
        }
        self.inner.ping().await
    }

    async fn reset_collection(&self) -> StoreResult<()> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reset.load(Ordering::SeqCst) {
            return Err(StoreError::from_backend(
                "reset_collection",
                "HTTP 503: unavailable",
                Some(503),
            ));
        }
        self.inner.reset_collection().await
    }

    async fn close(&self) -> StoreResult<()> {
        self.inner.close().await
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        self.inner.list_collections().await
    }
}
