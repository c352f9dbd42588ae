//! The provider interface
//!
//! Every backend implements [`VectorProvider`] identically. Callers hold
//! providers as `Arc<dyn VectorProvider>`, so the trait is object safe and
//! async methods go through `async_trait`.

use crate::session::{SessionSnapshot, SessionState};
use async_trait::async_trait;
use forest_core::{Metadata, Namespace, QueryMatch, QueryOptions, Record, StoreResult};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// How a provider keeps its data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    /// In-process, lost on drop
    Memory,
    /// In-process, persisted to a data directory
    Persistent,
    /// Remote HTTP service
    Server,
}

impl fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderMode::Memory => f.write_str("memory"),
            ProviderMode::Persistent => f.write_str("persistent"),
            ProviderMode::Server => f.write_str("server"),
        }
    }
}

/// Result of [`VectorProvider::initialize`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitializeOutcome {
    /// Always true on `Ok`
    pub success: bool,
    /// Provider name
    pub provider: String,
    /// Active collection
    pub collection: String,
    /// Storage mode
    pub mode: ProviderMode,
}

/// Provider status report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    /// Provider name
    pub provider: String,
    /// Storage mode
    pub mode: ProviderMode,
    /// Session state
    pub session: SessionSnapshot,
}

/// A vector backend
///
/// Any call that fails with a corruption- or connectivity-classified error
/// marks the session disconnected before returning.
#[async_trait]
pub trait VectorProvider: Send + Sync {
    /// Provider name (`"local"`, `"chroma"`, ...)
    fn name(&self) -> &str;

    /// Storage mode
    fn mode(&self) -> ProviderMode;

    /// Shared session state
    fn session(&self) -> &Arc<SessionState>;

    /// Open (or create) `collection` and make it active.
    ///
    /// Idempotent. Switching to a different collection keeps a healthy
    /// underlying connection.
    async fn initialize(&self, collection: &str) -> StoreResult<InitializeOutcome>;

    /// Insert or overwrite a record
    async fn upsert_vector(&self, id: &str, vector: &[f32], metadata: Metadata)
        -> StoreResult<()>;

    /// Similarity query, most similar first, below-threshold results excluded
    async fn query_vectors(
        &self,
        query: &[f32],
        options: &QueryOptions,
    ) -> StoreResult<Vec<QueryMatch>>;

    /// Delete one record; deleting an absent id is not an error
    async fn delete_vector(&self, id: &str) -> StoreResult<()>;

    /// Delete every record in `namespace`, returning how many were removed
    async fn delete_namespace(&self, namespace: &Namespace) -> StoreResult<usize>;

    /// List records, optionally restricted to ids starting with `prefix`
    async fn list_vectors(&self, prefix: Option<&str>) -> StoreResult<Vec<Record>>;

    /// Liveness check. Records the result as the last health check and
    /// marks the session disconnected on failure.
    async fn ping(&self) -> bool;

    /// Drop and recreate the active collection. Clears the reconnect counter
    /// and marks the session connected on success.
    async fn reset_collection(&self) -> StoreResult<()>;

    /// Release resources and stop background activity. Idempotent.
    async fn close(&self) -> StoreResult<()>;

    /// Names of collections known to the backend
    async fn list_collections(&self) -> StoreResult<Vec<String>>;

    /// Status snapshot
    fn status(&self) -> ProviderStatus {
        ProviderStatus {
            provider: self.name().to_string(),
            mode: self.mode(),
            session: self.session().snapshot(),
        }
    }
}
