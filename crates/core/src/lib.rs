//! Core types for the Forest knowledge store
//!
//! This crate defines the foundational types used throughout the workspace:
//! - Record, Namespace, QueryOptions, QueryMatch: the vector record model
//! - MetadataValue: flat metadata and the flattening rules
//! - MetadataFilter: equality filters for queries
//! - StoreError: the failure taxonomy shared by every crate
//! - classify: corruption/connectivity classification of backend failures
//! - BackoffPolicy: bounded exponential backoff
//! - StoreConfig: `forest.toml` configuration
//! - TaskNode, TaskTree: the task tree payload and its field allow-list

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod classify;
pub mod config;
pub mod error;
pub mod filter;
pub mod metadata;
pub mod record;
pub mod task;

pub use backoff::BackoffPolicy;
pub use classify::{classify_failure, FailureClass, SignatureSet};
pub use config::{
    ChromaConfig, LifecycleConfig, LogLevel, ProviderKind, RecoveryConfig, StoreConfig,
    CONFIG_FILE_NAME, DEFAULT_COLLECTION,
};
pub use error::{FieldViolation, StoreError, StoreResult, StructuralWriteError};
pub use filter::MetadataFilter;
pub use metadata::{
    flatten_json, flatten_metadata, flatten_value, metadata_to_json, Metadata, MetadataValue,
};
pub use record::{
    parse_vector, similarity_from_distance, validate_collection_name, validate_record_id,
    validate_vector, Namespace, QueryMatch, QueryOptions, Record, DEFAULT_QUERY_LIMIT,
    DEFAULT_QUERY_THRESHOLD,
};
pub use task::{
    is_allowed_field, is_always_writable, validate_node, TaskNode, TaskTree, ALWAYS_WRITABLE,
    TASK_NODE_FIELDS,
};
