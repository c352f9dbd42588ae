//! Store engine for the Forest knowledge store
//!
//! This crate sits between callers and the active provider:
//! - [`ConnectionManager`]: lazy, bounded reconnect with exponential backoff
//! - [`RecoveryController`]: collection reset on corruption-classified errors
//! - [`QueryCache`]: query results, cleared by writes and recoveries
//! - [`KnowledgeStore`]: the facade tying these to an optional managed
//!   backend process
//!
//! The engine is the only component that knows about:
//! - Retry policy (reconnect once per call, recover and retry once)
//! - Which state must be dropped when the collection is reset

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod connection;
pub mod recovery;
pub mod store;

#[cfg(test)]
mod testing;

pub use cache::{CacheStats, QueryCache};
pub use connection::ConnectionManager;
pub use recovery::{RecoveryController, RecoveryHook, RecoveryOutcome, RecoveryStats};
pub use store::{HealthStatus, KnowledgeStore, StoreStatus};
