//! Error types for the Forest knowledge store
//!
//! Every crate in the workspace reports failures through [`StoreError`].
//! The variants follow the store's failure taxonomy:
//!
//! | Variant | Retried? | Effect |
//! |---------|----------|--------|
//! | `Validation`, `StructuralWrite` | never | surfaced immediately |
//! | `Connectivity` | by the next caller | provider marked disconnected |
//! | `Corruption` | via recovery | provider marked disconnected, collection reset |
//! | `Terminal`, `MaxRetriesExceeded` | never | caller falls back to non-vector path |
//! | `ProcessLifecycle` | bounded | backend process could not be managed |

use crate::classify::{FailureClass, SignatureSet};
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Error type for the knowledge store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed input (non-numeric vector, bad collection name, ...)
    #[error("Validation error: {message}")]
    Validation {
        /// What was wrong with the input
        message: String,
    },

    /// A guarded mutation introduced an invalid task node and was rolled back
    #[error(transparent)]
    StructuralWrite(#[from] StructuralWriteError),

    /// Transport-level failure that does not match a corruption signature
    #[error("Connectivity error during {operation}: {message}")]
    Connectivity {
        /// Store operation that failed
        operation: String,
        /// Underlying transport message
        message: String,
    },

    /// The backend collection is in a state that only a reset can repair
    #[error("Corruption detected during {operation}: {message}")]
    Corruption {
        /// Store operation that failed
        operation: String,
        /// Underlying backend message
        message: String,
    },

    /// Vector intelligence is unavailable; callers should use their fallback path
    #[error("Vector store unavailable: {reason}")]
    Terminal {
        /// Why the store gave up
        reason: String,
    },

    /// The bounded reconnect counter is exhausted
    #[error("Maximum reconnection attempts exceeded ({attempts}/{max})")]
    MaxRetriesExceeded {
        /// Attempts recorded so far
        attempts: u32,
        /// Configured maximum
        max: u32,
    },

    /// Spawn, readiness or shutdown failure of the backend process
    #[error("Process lifecycle error: {message}")]
    ProcessLifecycle {
        /// Failure description
        message: String,
    },

    /// Backend failure that is neither corruption nor connectivity
    #[error("Backend error during {operation}: {message}")]
    Backend {
        /// Store operation that failed
        operation: String,
        /// Backend message
        message: String,
        /// HTTP status, when the backend is server-backed
        status: Option<u16>,
    },

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error (local persistence, data directories)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl StoreError {
    /// Build a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        StoreError::Validation {
            message: message.into(),
        }
    }

    /// Build a terminal error
    pub fn terminal(reason: impl Into<String>) -> Self {
        StoreError::Terminal {
            reason: reason.into(),
        }
    }

    /// Build a process lifecycle error
    pub fn process(message: impl Into<String>) -> Self {
        StoreError::ProcessLifecycle {
            message: message.into(),
        }
    }

    /// Classify a raw backend failure with the default signature set.
    pub fn from_backend(
        operation: impl Into<String>,
        message: impl Into<String>,
        status: Option<u16>,
    ) -> Self {
        Self::from_backend_with(&SignatureSet::default(), operation, message, status)
    }

    /// Classify a raw backend failure with a caller-supplied signature set.
    pub fn from_backend_with(
        signatures: &SignatureSet,
        operation: impl Into<String>,
        message: impl Into<String>,
        status: Option<u16>,
    ) -> Self {
        let operation = operation.into();
        let message = message.into();
        match signatures.classify(&message, status) {
            FailureClass::Corruption => StoreError::Corruption { operation, message },
            FailureClass::Connectivity => StoreError::Connectivity { operation, message },
            FailureClass::Other => StoreError::Backend {
                operation,
                message,
                status,
            },
        }
    }

    /// Check if this error is a corruption signature
    pub fn is_corruption(&self) -> bool {
        matches!(self, StoreError::Corruption { .. })
    }

    /// Check if this error is a plain connectivity failure
    pub fn is_connectivity(&self) -> bool {
        matches!(self, StoreError::Connectivity { .. })
    }

    /// Errors that must flip the provider session to disconnected
    pub fn marks_disconnected(&self) -> bool {
        self.is_corruption() || self.is_connectivity()
    }

    /// Errors worth retrying (by reconnect or recovery)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Connectivity { .. }
                | StoreError::Corruption { .. }
                | StoreError::ProcessLifecycle { .. }
        )
    }

    /// Programming errors reported immediately
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            StoreError::Validation { .. } | StoreError::StructuralWrite(_)
        )
    }

    /// "Vector intelligence unavailable": continue on the non-vector path
    pub fn is_vector_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::Terminal { .. } | StoreError::MaxRetriesExceeded { .. }
        )
    }
}

// =============================================================================
// Structural write violations
// =============================================================================

/// One offending field on a task node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldViolation {
    /// A required field is absent
    Missing {
        /// Field name
        field: String,
    },
    /// A required string field is present but empty
    Empty {
        /// Field name
        field: String,
    },
    /// The field holds a value of the wrong JSON type
    WrongType {
        /// Field name
        field: String,
        /// Human-readable expected type
        expected: &'static str,
    },
    /// The field is not in the node allow-list
    UnknownField {
        /// Field name
        field: String,
    },
    /// The field is allow-listed but outside the caller's write scope
    OutOfScope {
        /// Field name
        field: String,
    },
}

impl FieldViolation {
    /// Name of the offending field
    pub fn field(&self) -> &str {
        match self {
            FieldViolation::Missing { field }
            | FieldViolation::Empty { field }
            | FieldViolation::WrongType { field, .. }
            | FieldViolation::UnknownField { field }
            | FieldViolation::OutOfScope { field } => field,
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldViolation::Missing { field } => write!(f, "missing required field '{}'", field),
            FieldViolation::Empty { field } => write!(f, "required field '{}' is empty", field),
            FieldViolation::WrongType { field, expected } => {
                write!(f, "field '{}' must be {}", field, expected)
            }
            FieldViolation::UnknownField { field } => write!(f, "unknown field '{}'", field),
            FieldViolation::OutOfScope { field } => {
                write!(f, "unexpected field '{}' (outside write scope)", field)
            }
        }
    }
}

/// A guarded mutation wrote one or more invalid task nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralWriteError {
    /// Guarded function that performed the write
    pub function: String,
    /// Offending node id, if the node had one
    pub node_id: Option<String>,
    /// Every violation found on the node
    pub violations: Vec<FieldViolation>,
}

impl StructuralWriteError {
    /// Names of all offending fields, in detection order
    pub fn offending_fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field()).collect()
    }
}

impl fmt::Display for StructuralWriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Structural write rejected in '{}'", self.function)?;
        if let Some(id) = &self.node_id {
            write!(f, " for node '{}'", id)?;
        }
        write!(f, ": ")?;
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", violation)?;
        }
        Ok(())
    }
}

impl std::error::Error for StructuralWriteError {}
