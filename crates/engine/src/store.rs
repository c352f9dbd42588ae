//! Knowledge store facade
//!
//! Every operation runs as:
//!
//! 1. `ensure_connection()` (bounded reconnect)
//! 2. the provider call
//! 3. on a corruption-classified error: recovery, then one retry
//!
//! Connectivity errors propagate; the provider is already marked
//! disconnected, so the next call reconnects. Validation errors are raised
//! before any provider call.

use crate::cache::{CacheStats, QueryCache};
use crate::connection::ConnectionManager;
use crate::recovery::{RecoveryController, RecoveryHook, RecoveryStats};
use chrono::{DateTime, Utc};
use forest_core::{
    flatten_json, parse_vector, validate_collection_name, validate_record_id, validate_vector,
    Metadata, Namespace, ProviderKind, QueryMatch, QueryOptions, Record, StoreConfig, StoreResult,
};
use forest_lifecycle::{LifecycleManager, LifecycleState, LifecycleStatus, StartOutcome};
use forest_provider::{
    provider_from_config, ConnectionState, HealthCheck, InitializeOutcome, ProviderStatus,
    VectorProvider,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Report returned by [`KnowledgeStore::get_status`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    /// Provider and session state
    pub provider: ProviderStatus,
    /// Collection reconnects target
    pub collection: String,
    /// Reconnect ceiling
    pub max_reconnect_attempts: u32,
    /// Recovery counters
    pub recovery: RecoveryStats,
    /// Query cache counters
    pub cache: CacheStats,
    /// Backend process, when managed by the store
    pub lifecycle: Option<LifecycleStatus>,
}

/// Report returned by [`KnowledgeStore::get_health_status`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    /// Provider reachable and, if managed, backend process running
    pub healthy: bool,
    /// Result of the ping made for this report
    pub provider_reachable: bool,
    /// Session connection state after the ping
    pub connection: ConnectionState,
    /// Reconnect attempts since the last successful connect
    pub reconnect_attempts: u32,
    /// Health check recorded by the ping
    pub last_health_check: Option<HealthCheck>,
    /// Backend process state, when managed by the store
    pub lifecycle_state: Option<LifecycleState>,
    /// When this report was made
    pub checked_at: DateTime<Utc>,
}

/// Vector-indexed knowledge store
pub struct KnowledgeStore {
    config: StoreConfig,
    provider: Arc<dyn VectorProvider>,
    connection: ConnectionManager,
    recovery: RecoveryController,
    cache: Arc<QueryCache>,
    lifecycle: Option<LifecycleManager>,
    closed: AtomicBool,
}

impl fmt::Debug for KnowledgeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnowledgeStore")
            .field("provider", &self.provider.name())
            .field("collection", &self.connection.collection())
            .field("connected", &self.connection.is_connected())
            .field("lifecycle", &self.lifecycle.is_some())
            .finish()
    }
}

impl KnowledgeStore {
    /// Open a store: build the provider, start the backend process when
    /// configured, and initialize the collection.
    ///
    /// An unreachable backend does not fail `open`; the first operation
    /// reconnects.
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let provider = provider_from_config(&config)?;

        let lifecycle = if config.lifecycle.enabled && config.provider == ProviderKind::Chroma {
            let manager = LifecycleManager::new(config.lifecycle.clone())?;
            match manager.start_parallel().wait().await {
                StartOutcome::Failed { error } => {
                    warn!(target: "forest::store", error = %error, "Backend process did not start");
                }
                outcome => {
                    info!(target: "forest::store", outcome = ?outcome, "Backend process ready");
                }
            }
            Some(manager)
        } else {
            None
        };

        let store = Self::assemble(config, provider, lifecycle);
        let generation = store.recovery.generation();
        let initialized = match store.initialize().await {
            Err(err) if err.is_corruption() => {
                warn!(
                    target: "forest::store",
                    error = %err,
                    "Collection corrupt at open, recovering"
                );
                store.recovery.recover(generation, &err).await?;
                store.initialize().await
            }
            other => other,
        };
        match initialized {
            Ok(outcome) => {
                info!(
                    target: "forest::store",
                    provider = %outcome.provider,
                    collection = %outcome.collection,
                    mode = %outcome.mode,
                    "Knowledge store opened"
                );
            }
            Err(err) if err.is_connectivity() || err.is_vector_unavailable() => {
                warn!(
                    target: "forest::store",
                    error = %err,
                    "Backend unavailable at open, will reconnect on first use"
                );
            }
            Err(err) => return Err(err),
        }
        Ok(store)
    }

    /// Store over an existing provider. Does not initialize.
    pub fn with_provider(config: StoreConfig, provider: Arc<dyn VectorProvider>) -> Self {
        Self::assemble(config, provider, None)
    }

    fn assemble(
        config: StoreConfig,
        provider: Arc<dyn VectorProvider>,
        lifecycle: Option<LifecycleManager>,
    ) -> Self {
        let connection = ConnectionManager::new(
            Arc::clone(&provider),
            config.reconnect.clone(),
            config.collection.clone(),
        );
        let recovery = RecoveryController::new(Arc::clone(&provider), config.recovery.enabled);
        let cache = Arc::new(QueryCache::new(config.query_cache_capacity));
        recovery.register_hook(cache.clone());

        Self {
            config,
            provider,
            connection,
            recovery,
            cache,
            lifecycle,
            closed: AtomicBool::new(false),
        }
    }

    /// Configuration the store was opened with
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Active provider
    pub fn provider(&self) -> &Arc<dyn VectorProvider> {
        &self.provider
    }

    /// Backend process manager, if the store manages one
    pub fn lifecycle(&self) -> Option<&LifecycleManager> {
        self.lifecycle.as_ref()
    }

    /// Register state to clear when the collection is reset
    pub fn register_recovery_hook(&self, hook: Arc<dyn RecoveryHook>) {
        self.recovery.register_hook(hook);
    }

    // =========================================================================
    // Connection
    // =========================================================================

    /// Initialize the configured (or last used) collection. Idempotent.
    pub async fn initialize(&self) -> StoreResult<InitializeOutcome> {
        self.connection.connect(None).await
    }

    /// Switch to another collection
    pub async fn use_collection(&self, collection: &str) -> StoreResult<InitializeOutcome> {
        validate_collection_name(collection)?;
        let outcome = self.connection.connect(Some(collection)).await?;
        self.cache.clear();
        Ok(outcome)
    }

    /// True if the provider session is connected
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Clear an exhausted reconnect counter
    pub fn reset_reconnect_attempts(&self) {
        self.connection.reset_attempts();
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Insert or overwrite a record; `metadata` is flattened (composites
    /// become JSON text, nulls are dropped)
    pub async fn upsert(&self, id: &str, vector: &[f32], metadata: &JsonValue) -> StoreResult<()> {
        self.upsert_flat(id, vector, flatten_json(metadata)).await
    }

    /// Like [`KnowledgeStore::upsert`] with the vector given as JSON.
    ///
    /// # Errors
    ///
    /// `Validation` if `vector` is not an array of numbers.
    pub async fn upsert_value(
        &self,
        id: &str,
        vector: &JsonValue,
        metadata: &JsonValue,
    ) -> StoreResult<()> {
        let vector = parse_vector(vector)?;
        self.upsert(id, &vector, metadata).await
    }

    /// Insert or overwrite a record with already flat metadata
    pub async fn upsert_record(&self, record: Record) -> StoreResult<()> {
        self.upsert_flat(&record.id, &record.vector, record.metadata)
            .await
    }

    async fn upsert_flat(&self, id: &str, vector: &[f32], metadata: Metadata) -> StoreResult<()> {
        validate_record_id(id)?;
        validate_vector(vector)?;
        self.execute("upsert", |provider| {
            let metadata = metadata.clone();
            async move { provider.upsert_vector(id, vector, metadata).await }
        })
        .await?;
        self.cache.clear();
        Ok(())
    }

    /// Similarity query; results are cached until the next write or reset
    pub async fn query(
        &self,
        vector: &[f32],
        options: &QueryOptions,
    ) -> StoreResult<Vec<QueryMatch>> {
        validate_vector(vector)?;
        let collection = self.connection.collection();
        if let Some(hit) = self.cache.get(&collection, vector, options) {
            debug!(target: "forest::store", results = hit.len(), "Query served from cache");
            return Ok(hit);
        }
        let epoch = self.cache.epoch();
        let results = self
            .execute("query", |provider| async move {
                provider.query_vectors(vector, options).await
            })
            .await?;
        if !self
            .cache
            .insert(epoch, &collection, vector, options, results.clone())
        {
            debug!(target: "forest::store", "Collection changed during query, result not cached");
        }
        Ok(results)
    }

    /// Delete one record
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        validate_record_id(id)?;
        self.execute("delete", |provider| async move {
            provider.delete_vector(id).await
        })
        .await?;
        self.cache.clear();
        Ok(())
    }

    /// Delete every record in `namespace`
    pub async fn delete_namespace(&self, namespace: &Namespace) -> StoreResult<usize> {
        let removed = self
            .execute("delete_namespace", |provider| async move {
                provider.delete_namespace(namespace).await
            })
            .await?;
        self.cache.clear();
        info!(
            target: "forest::store",
            namespace = %namespace.as_str(),
            removed,
            "Namespace deleted"
        );
        Ok(removed)
    }

    /// List records, optionally restricted to an id prefix
    pub async fn list(&self, prefix: Option<&str>) -> StoreResult<Vec<Record>> {
        self.execute("list", |provider| async move {
            provider.list_vectors(prefix).await
        })
        .await
    }

    /// Collections known to the backend
    pub async fn list_collections(&self) -> StoreResult<Vec<String>> {
        self.execute("list_collections", |provider| async move {
            provider.list_collections().await
        })
        .await
    }

    // =========================================================================
    // Health and maintenance
    // =========================================================================

    /// Liveness check against the provider
    pub async fn ping(&self) -> bool {
        self.provider.ping().await
    }

    /// Drop and recreate the collection, clearing caches and hooks
    pub async fn reset_collection(&self) -> StoreResult<()> {
        self.recovery.reset().await
    }

    /// Close the provider and stop a managed backend process. Idempotent.
    pub async fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let closed = self.provider.close().await;
        if let Some(lifecycle) = &self.lifecycle {
            let outcome = lifecycle.stop().await?;
            info!(target: "forest::store", outcome = ?outcome, "Backend process stopped");
        }
        self.cache.clear();
        info!(target: "forest::store", "Knowledge store closed");
        closed
    }

    /// Status snapshot
    pub fn get_status(&self) -> StoreStatus {
        StoreStatus {
            provider: self.provider.status(),
            collection: self.connection.collection(),
            max_reconnect_attempts: self.connection.policy().max_attempts,
            recovery: self.recovery.stats(),
            cache: self.cache.stats(),
            lifecycle: self.lifecycle.as_ref().map(LifecycleManager::status),
        }
    }

    /// Ping the backend and report overall health
    pub async fn get_health_status(&self) -> HealthStatus {
        let provider_reachable = self.provider.ping().await;
        let session = self.provider.session().snapshot();
        let lifecycle_state = self.lifecycle.as_ref().map(LifecycleManager::state);
        let process_ok = !matches!(
            lifecycle_state,
            Some(LifecycleState::Stopped | LifecycleState::Stopping)
        );
        HealthStatus {
            healthy: provider_reachable && process_ok,
            provider_reachable,
            connection: session.state,
            reconnect_attempts: session.reconnect_attempts,
            last_health_check: session.last_health_check,
            lifecycle_state,
            checked_at: Utc::now(),
        }
    }

    /// Recovery counters
    pub fn recovery_stats(&self) -> RecoveryStats {
        self.recovery.stats()
    }

    // =========================================================================
    // Execution
    // =========================================================================

    async fn execute<T, F, Fut>(&self, operation: &'static str, op: F) -> StoreResult<T>
    where
        F: Fn(Arc<dyn VectorProvider>) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let generation = self.recovery.generation();
        match self.attempt(&op).await {
            Err(err) if err.is_corruption() => {
                self.recovery.recover(generation, &err).await?;
                info!(target: "forest::store", operation, "Retrying after recovery");
                self.attempt(&op).await
            }
            Err(err) => {
                if err.is_vector_unavailable() {
                    warn!(target: "forest::store", operation, error = %err, "Vector store unavailable");
                }
                Err(err)
            }
            ok => ok,
        }
    }

    async fn attempt<T, F, Fut>(&self, op: &F) -> StoreResult<T>
    where
        F: Fn(Arc<dyn VectorProvider>) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        self.connection.ensure_connection().await?;
        op(Arc::clone(&self.provider)).await
    }
}
