//! Forest knowledge store
//!
//! A vector-indexed persistence layer for the Forest task tree: pluggable
//! providers (in-process or a Chroma-compatible server), bounded reconnects,
//! corruption recovery, supervision of a locally spawned backend, and a
//! write-integrity guard for task tree mutations.
//!
//! # Quick Start
//!
//! ```ignore
//! use forest_store::{KnowledgeStore, QueryOptions, StoreConfig};
//! use serde_json::json;
//!
//! let store = KnowledgeStore::open(StoreConfig::local()).await?;
//! store.upsert("tree1:t1", &[0.1, 0.9], &json!({"title": "Learn scales"})).await?;
//! let hits = store.query(&[0.1, 0.9], &QueryOptions::new()).await?;
//! ```
//!
//! Callers treat errors for which `StoreError::is_vector_unavailable` holds
//! as "vector intelligence unavailable" and continue on their non-vector
//! path.

pub use forest_core::{
    flatten_json, flatten_metadata, BackoffPolicy, ChromaConfig, FieldViolation, LifecycleConfig,
    LogLevel, Metadata, MetadataFilter, MetadataValue, Namespace, ProviderKind, QueryMatch,
    QueryOptions, Record, RecoveryConfig, StoreConfig, StoreError, StoreResult,
    StructuralWriteError, TaskNode, TaskTree,
};
pub use forest_engine::{
    CacheStats, ConnectionManager, HealthStatus, KnowledgeStore, RecoveryController,
    RecoveryHook, RecoveryOutcome, RecoveryStats, StoreStatus,
};
pub use forest_guard::{MutationGuard, TreeHandle, WriteScope, WriteScopes};
pub use forest_lifecycle::{
    HealthProbe, HttpProbe, LifecycleError, LifecycleEvent, LifecycleManager, LifecycleState,
    LifecycleStatus, ShutdownOutcome, StartHandle, StartOutcome,
};
pub use forest_provider::{
    provider_from_config, ChromaProvider, ConnectionState, InitializeOutcome, LocalProvider,
    ProviderMode, SessionSnapshot, SessionState, VectorProvider,
};

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `forest=info`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    init_tracing_with("forest=info")
}

/// Like [`init_tracing`] with a caller-chosen fallback directive
pub fn init_tracing_with(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
