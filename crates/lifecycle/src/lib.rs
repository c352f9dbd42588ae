//! Backend process lifecycle for the Forest knowledge store
//!
//! When the store is configured against a locally hosted Chroma-compatible
//! server, [`LifecycleManager`] spawns it, waits for readiness, monitors its
//! health and restarts or stops it.
//!
//! ```text
//! STOPPED ──start──▶ STARTING ──ready──▶ RUNNING ──stop──▶ STOPPING ──▶ STOPPED
//!                       │                   │
//!                       └──failed──▶ STOPPED └──exit/unhealthy──▶ restart
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod manager;
pub mod probe;
pub mod process;
mod supervisor;

pub use error::{LifecycleError, LifecycleResult};
pub use manager::{
    HealthReport, LifecycleEvent, LifecycleManager, LifecycleState, LifecycleStatus,
    StartHandle, StartOutcome,
};
pub use probe::{port_in_use, HealthProbe, HttpProbe};
pub use process::{BackendProcess, ShutdownOutcome};
