//! Connection manager
//!
//! Drives the provider session through `Disconnected → Connecting →
//! Connected`. Reconnects are serialized behind an async mutex and bounded
//! by a [`BackoffPolicy`]: once the attempt counter reaches the ceiling,
//! [`ConnectionManager::ensure_connection`] fails fast with
//! `MaxRetriesExceeded` and makes no network call until the counter is reset
//! (by a successful reset/initialize or [`ConnectionManager::reset_attempts`]).

use forest_core::{BackoffPolicy, StoreError, StoreResult};
use forest_provider::{InitializeOutcome, VectorProvider};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Owns reconnect policy for one provider
pub struct ConnectionManager {
    provider: Arc<dyn VectorProvider>,
    policy: BackoffPolicy,
    collection: RwLock<String>,
    reconnect_lock: Mutex<()>,
}

impl ConnectionManager {
    /// Create a manager for `provider`, targeting `collection`
    pub fn new(
        provider: Arc<dyn VectorProvider>,
        policy: BackoffPolicy,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            policy,
            collection: RwLock::new(collection.into()),
            reconnect_lock: Mutex::new(()),
        }
    }

    /// Managed provider
    pub fn provider(&self) -> &Arc<dyn VectorProvider> {
        &self.provider
    }

    /// Reconnect policy
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Collection reconnects target
    pub fn collection(&self) -> String {
        self.collection.read().clone()
    }

    /// True if the provider session is connected
    pub fn is_connected(&self) -> bool {
        self.provider.session().is_connected()
    }

    /// Explicit initialize, optionally switching collection.
    ///
    /// Serialized with reconnects. Success resets the attempt counter.
    pub async fn connect(&self, collection: Option<&str>) -> StoreResult<InitializeOutcome> {
        let _guard = self.reconnect_lock.lock().await;
        let target = match collection {
            Some(name) => name.to_string(),
            None => self.collection(),
        };
        let outcome = self.provider.initialize(&target).await?;
        *self.collection.write() = target;
        Ok(outcome)
    }

    /// Make sure the provider is connected, reconnecting with backoff if not.
    ///
    /// # Errors
    ///
    /// - `MaxRetriesExceeded` when the counter is exhausted (no network call)
    /// - the provider's initialize error when this attempt fails
    pub async fn ensure_connection(&self) -> StoreResult<()> {
        let session = self.provider.session();
        if session.is_connected() {
            return Ok(());
        }

        let _guard = self.reconnect_lock.lock().await;
        if session.is_connected() {
            return Ok(());
        }

        let attempts = session.reconnect_attempts();
        if self.policy.is_exhausted(attempts) {
            warn!(
                target: "forest::connection",
                attempts,
                max = self.policy.max_attempts,
                "Reconnect attempts exhausted"
            );
            return Err(StoreError::MaxRetriesExceeded {
                attempts,
                max: self.policy.max_attempts,
            });
        }

        let attempt = session.begin_reconnect_attempt();
        let delay = self.policy.delay_for_attempt(attempt);
        let collection = self.collection();
        info!(
            target: "forest::connection",
            attempt,
            max = self.policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            collection = %collection,
            "Reconnecting"
        );
        tokio::time::sleep(delay).await;

        match self.provider.initialize(&collection).await {
            Ok(_) => {
                info!(target: "forest::connection", attempt, "Reconnected");
                Ok(())
            }
            Err(err) => {
                session.mark_disconnected();
                warn!(
                    target: "forest::connection",
                    attempt,
                    error = %err,
                    "Reconnect attempt failed"
                );
                Err(err)
            }
        }
    }

    /// Manually clear the reconnect counter
    pub fn reset_attempts(&self) {
        self.provider.session().reset_reconnect_attempts();
        info!(target: "forest::connection", "Reconnect attempts reset");
    }
}
