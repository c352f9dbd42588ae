//! Lifecycle errors

use forest_core::StoreError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for lifecycle operations
pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;

/// Failure to start, monitor or stop the backend process
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The data directory could not be created
    #[error("failed to prepare data directory {}: {source}", path.display())]
    DataDir {
        /// Directory that was being created
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The backend command could not be spawned
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        /// Program that was spawned
        command: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The child exited before it became ready
    #[error("backend exited during startup ({status})")]
    ExitedDuringStartup {
        /// Exit status as reported by the OS
        status: String,
    },

    /// The readiness probe never succeeded
    #[error("backend not ready at {url} after {waited_ms} ms")]
    ReadinessTimeout {
        /// Probed URL
        url: String,
        /// How long startup waited
        waited_ms: u64,
    },

    /// Every startup attempt failed
    #[error("startup failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the final attempt
        last: Box<LifecycleError>,
    },

    /// Sending the termination signal failed
    #[error("failed to signal process {pid}: {message}")]
    Signal {
        /// Target process
        pid: u32,
        /// OS error message
        message: String,
    },

    /// The health probe could not be built
    #[error("health probe setup failed: {0}")]
    Probe(String),

    /// Waiting on or killing the child failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The supervisor task is gone (manager dropped or runtime shut down)
    #[error("lifecycle supervisor is not running")]
    SupervisorGone,
}

impl From<LifecycleError> for StoreError {
    fn from(e: LifecycleError) -> Self {
        StoreError::process(e.to_string())
    }
}
