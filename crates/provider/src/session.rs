//! Provider session state
//!
//! One `SessionState` is shared (via `Arc`) between a provider, the
//! connection manager and the recovery controller. All fields sit behind a
//! single `parking_lot::RwLock`; the lock is never held across an `.await`.

use chrono::{DateTime, Utc};
use forest_core::{StoreError, StoreResult};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;

/// Connection state machine: `Disconnected → Connecting → Connected`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// No usable backend connection
    #[default]
    Disconnected,
    /// (Re)initialization in progress
    Connecting,
    /// Backend reachable and collection open
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("DISCONNECTED"),
            ConnectionState::Connecting => f.write_str("CONNECTING"),
            ConnectionState::Connected => f.write_str("CONNECTED"),
        }
    }
}

/// Result of the most recent health check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCheck {
    /// When the check ran
    pub timestamp: DateTime<Utc>,
    /// Whether the backend answered
    pub healthy: bool,
    /// Failure detail, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Point-in-time copy of the session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// `state == Connected`
    pub is_connected: bool,
    /// Connection state
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful connect
    pub reconnect_attempts: u32,
    /// Most recent health check
    pub last_health_check: Option<HealthCheck>,
    /// Active collection
    pub collection_name: Option<String>,
}

#[derive(Debug, Default)]
struct SessionInner {
    state: ConnectionState,
    reconnect_attempts: u32,
    last_health_check: Option<HealthCheck>,
    collection_name: Option<String>,
}

/// Shared, lock-protected session state of one provider
#[derive(Debug, Default)]
pub struct SessionState {
    inner: RwLock<SessionInner>,
}

impl SessionState {
    /// Fresh, disconnected session
    pub fn new() -> Self {
        Self::default()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.inner.read().state
    }

    /// True if connected
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Reconnect attempts since the last successful connect
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.read().reconnect_attempts
    }

    /// Active collection name
    pub fn collection_name(&self) -> Option<String> {
        self.inner.read().collection_name.clone()
    }

    /// Enter `Connecting`
    pub fn mark_connecting(&self) {
        self.inner.write().state = ConnectionState::Connecting;
    }

    /// A (re)connect succeeded: `Connected`, attempts reset to 0
    pub fn mark_connected(&self, collection: &str) {
        let mut inner = self.inner.write();
        inner.state = ConnectionState::Connected;
        inner.reconnect_attempts = 0;
        inner.collection_name = Some(collection.to_string());
    }

    /// Enter `Disconnected`; attempts are left untouched
    pub fn mark_disconnected(&self) {
        self.inner.write().state = ConnectionState::Disconnected;
    }

    /// Count one reconnect attempt and return the new count
    pub fn begin_reconnect_attempt(&self) -> u32 {
        let mut inner = self.inner.write();
        inner.reconnect_attempts = inner.reconnect_attempts.saturating_add(1);
        inner.reconnect_attempts
    }

    /// Clear the reconnect counter
    pub fn reset_reconnect_attempts(&self) {
        self.inner.write().reconnect_attempts = 0;
    }

    /// Overwrite the reconnect counter
    pub fn set_reconnect_attempts(&self, attempts: u32) {
        self.inner.write().reconnect_attempts = attempts;
    }

    /// Record a health check; a failed check also marks the session disconnected
    pub fn record_health_check(&self, healthy: bool, detail: Option<String>) {
        let mut inner = self.inner.write();
        inner.last_health_check = Some(HealthCheck {
            timestamp: Utc::now(),
            healthy,
            detail,
        });
        if !healthy {
            inner.state = ConnectionState::Disconnected;
        }
    }

    /// Pass a result through, marking the session disconnected when the
    /// error is corruption- or connectivity-classified.
    pub fn observe<T>(&self, operation: &str, result: StoreResult<T>) -> StoreResult<T> {
        if let Err(err) = &result {
            self.observe_error(operation, err);
        }
        result
    }

    /// Error half of [`SessionState::observe`]
    pub fn observe_error(&self, operation: &str, err: &StoreError) {
        if err.marks_disconnected() {
            tracing::warn!(
                target: "forest::connection",
                operation,
                corruption = err.is_corruption(),
                error = %err,
                "Provider marked disconnected"
            );
            self.mark_disconnected();
        }
    }

    /// Point-in-time copy
    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.read();
        SessionSnapshot {
            is_connected: inner.state == ConnectionState::Connected,
            state: inner.state,
            reconnect_attempts: inner.reconnect_attempts,
            last_health_check: inner.last_health_check.clone(),
            collection_name: inner.collection_name.clone(),
        }
    }
}
