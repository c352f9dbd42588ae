//! Corruption recovery
//!
//! When a backend error matches a corruption signature the only repair is to
//! drop and recreate the collection. Recovery runs these steps in order:
//!
//! 1. `reset_collection()` on the provider
//! 2. `clear_caches()` on every registered [`RecoveryHook`]
//! 3. `clear_stale_references()` on every hook (best effort, failures logged)
//! 4. record the timestamp and bump the recovery counter
//!
//! A failed reset is terminal: callers get `StoreError::Terminal` and fall
//! back to their non-vector path.
//!
//! Recoveries are serialized. Each caller passes the generation it observed
//! before its operation failed; if another caller already recovered since
//! then, the collection is not reset a second time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forest_core::{StoreError, StoreResult};
use forest_provider::VectorProvider;
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// State that depends on the backend collection and must be cleared when the
/// collection is reset
///
/// # Example
///
/// ```ignore
/// struct TaskIndex { /* ids of records known to be in the collection */ }
///
/// #[async_trait]
/// impl RecoveryHook for TaskIndex {
///     fn name(&self) -> &str { "task_index" }
///     fn clear_caches(&self) { /* drop in-memory id sets */ }
///     async fn clear_stale_references(&self) -> StoreResult<()> {
///         /* remove persisted vector ids from project files */
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait RecoveryHook: Send + Sync {
    /// Name used in logs; registration is deduplicated by name
    fn name(&self) -> &str;

    /// Clear in-memory caches keyed by collection state
    fn clear_caches(&self) {}

    /// Clear persisted metadata that references deleted records
    async fn clear_stale_references(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// What a call to [`RecoveryController::recover`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// This caller reset the collection
    Recovered,
    /// Another caller recovered after this caller's failure
    AlreadyRecovered,
}

/// Recovery counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecoveryStats {
    /// Successful recoveries
    pub recoveries: u64,
    /// Failed recovery attempts
    pub failures: u64,
    /// When the last successful recovery finished
    pub last_recovery: Option<DateTime<Utc>>,
    /// Error of the last failed attempt
    pub last_error: Option<String>,
}

/// Serializes corruption recovery for one provider
pub struct RecoveryController {
    provider: Arc<dyn VectorProvider>,
    enabled: bool,
    hooks: RwLock<Vec<Arc<dyn RecoveryHook>>>,
    lock: Mutex<()>,
    generation: AtomicU64,
    stats: RwLock<RecoveryStats>,
}

impl fmt::Debug for RecoveryController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryController")
            .field("provider", &self.provider.name())
            .field("enabled", &self.enabled)
            .field("hooks", &self.hook_names())
            .field("generation", &self.generation())
            .finish()
    }
}

impl RecoveryController {
    /// Create a controller; with `enabled == false` every corruption is terminal
    pub fn new(provider: Arc<dyn VectorProvider>, enabled: bool) -> Self {
        Self {
            provider,
            enabled,
            hooks: RwLock::new(Vec::new()),
            lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            stats: RwLock::new(RecoveryStats::default()),
        }
    }

    /// Register a hook. A hook with the same name is not registered twice.
    pub fn register_hook(&self, hook: Arc<dyn RecoveryHook>) {
        let mut hooks = self.hooks.write();
        if !hooks.iter().any(|h| h.name() == hook.name()) {
            info!(target: "forest::recovery", name = hook.name(), "Registered recovery hook");
            hooks.push(hook);
        }
    }

    /// Names of registered hooks, in registration order
    pub fn hook_names(&self) -> Vec<String> {
        self.hooks.read().iter().map(|h| h.name().to_string()).collect()
    }

    /// Completed recoveries so far; callers capture this before an operation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Counters
    pub fn stats(&self) -> RecoveryStats {
        self.stats.read().clone()
    }

    /// Recover from `cause`, observed by a caller at `observed_generation`.
    ///
    /// # Errors
    ///
    /// `StoreError::Terminal` if recovery is disabled or the reset fails.
    pub async fn recover(
        &self,
        observed_generation: u64,
        cause: &StoreError,
    ) -> StoreResult<RecoveryOutcome> {
        if !self.enabled {
            return Err(StoreError::terminal(format!(
                "corruption detected and recovery is disabled: {}",
                cause
            )));
        }

        let _guard = self.lock.lock().await;
        if self.generation() != observed_generation {
            info!(
                target: "forest::recovery",
                observed_generation,
                generation = self.generation(),
                "Collection already recovered"
            );
            return Ok(RecoveryOutcome::AlreadyRecovered);
        }

        warn!(
            target: "forest::recovery",
            provider = self.provider.name(),
            cause = %cause,
            "Corruption detected, resetting collection"
        );
        self.run_steps().await.map_err(|err| {
            StoreError::terminal(format!("collection reset failed after corruption: {}", err))
        })?;
        Ok(RecoveryOutcome::Recovered)
    }

    /// Run the recovery steps unconditionally (manual reset).
    ///
    /// Unlike [`RecoveryController::recover`], a reset failure is returned as
    /// the provider reported it.
    pub async fn reset(&self) -> StoreResult<()> {
        let _guard = self.lock.lock().await;
        info!(target: "forest::recovery", provider = self.provider.name(), "Manual collection reset");
        self.run_steps().await
    }

    async fn run_steps(&self) -> StoreResult<()> {
        if let Err(err) = self.provider.reset_collection().await {
            error!(target: "forest::recovery", error = %err, "Collection reset failed");
            let mut stats = self.stats.write();
            stats.failures += 1;
            stats.last_error = Some(err.to_string());
            return Err(err);
        }

        let hooks: Vec<Arc<dyn RecoveryHook>> = self.hooks.read().clone();
        for hook in &hooks {
            hook.clear_caches();
        }
        for hook in &hooks {
            if let Err(err) = hook.clear_stale_references().await {
                warn!(
                    target: "forest::recovery",
                    hook = hook.name(),
                    error = %err,
                    "Failed to clear stale references"
                );
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        {
            let mut stats = self.stats.write();
            stats.recoveries += 1;
            stats.last_recovery = Some(now);
        }
        info!(
            target: "forest::recovery",
            generation,
            hooks = hooks.len(),
            at = %now.to_rfc3339(),
            "Recovery complete"
        );
        Ok(())
    }
}
