//! Lifecycle manager handle
//!
//! [`LifecycleManager`] is a handle; the backend process itself is owned by
//! the supervisor task (see `supervisor`), which serializes every command
//! (start, stop, restart), health tick and child-exit notification. A stop
//! issued while a start is in flight runs after that start finishes.
//!
//! State is published on a `watch` channel and events on a `broadcast`
//! channel. Dropping the manager closes the command channel; the supervisor
//! then stops the process and exits.

use crate::error::{LifecycleError, LifecycleResult};
use crate::probe::{HealthProbe, HttpProbe};
use crate::process::ShutdownOutcome;
use crate::supervisor::{Command, Supervisor, Tracked};
use chrono::{DateTime, Utc};
use forest_core::LifecycleConfig;
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

const EVENT_CAPACITY: usize = 64;

/// Backend process state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// No process is managed
    Stopped,
    /// Spawned and waiting for readiness
    Starting,
    /// Ready (spawned by us or adopted)
    Running,
    /// Shutting down
    Stopping,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Stopped => "STOPPED",
            LifecycleState::Starting => "STARTING",
            LifecycleState::Running => "RUNNING",
            LifecycleState::Stopping => "STOPPING",
        };
        f.write_str(s)
    }
}

/// Published on the event channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A startup attempt began
    Starting {
        /// 1-based attempt number
        attempt: u32,
    },
    /// Our process passed the readiness probe
    Started {
        /// OS process id
        pid: u32,
    },
    /// Another process already serves the port and was adopted
    Adopted {
        /// Port in use
        port: u16,
    },
    /// A startup attempt failed
    StartFailed {
        /// 1-based attempt number
        attempt: u32,
        /// Failure description
        error: String,
    },
    /// A periodic health probe failed
    Unhealthy {
        /// Probe failure description
        detail: String,
    },
    /// The process exited without being asked to
    Exited {
        /// Exit code, if the process was not killed by a signal
        code: Option<i32>,
    },
    /// An automatic or explicit restart began
    Restarting {
        /// Why the restart happened
        reason: String,
    },
    /// A stop finished
    Stopped {
        /// How it ended
        outcome: ShutdownOutcome,
    },
}

/// Result of a start request
#[derive(Debug)]
pub enum StartOutcome {
    /// We spawned the backend and it became ready
    Started {
        /// OS process id
        pid: u32,
    },
    /// A backend was already serving (adopted or previously started)
    AlreadyRunning,
    /// Startup failed permanently
    Failed {
        /// Final error
        error: LifecycleError,
    },
}

impl StartOutcome {
    /// True unless the start failed
    pub fn is_running(&self) -> bool {
        !matches!(self, StartOutcome::Failed { .. })
    }
}

/// Pending start; resolves when startup finishes
#[derive(Debug)]
pub struct StartHandle {
    rx: oneshot::Receiver<StartOutcome>,
}

impl StartHandle {
    /// Wait for the outcome. Never fails; a vanished supervisor is reported
    /// as `Failed`.
    pub async fn wait(self) -> StartOutcome {
        self.rx.await.unwrap_or(StartOutcome::Failed {
            error: LifecycleError::SupervisorGone,
        })
    }
}

/// Outcome of the most recent health probe
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// When the probe ran
    pub timestamp: DateTime<Utc>,
    /// Whether it succeeded
    pub healthy: bool,
    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Snapshot for status endpoints
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleStatus {
    /// Current state
    pub state: LifecycleState,
    /// Pid of the process we spawned
    pub pid: Option<u32>,
    /// Probed host
    pub host: String,
    /// Backend port
    pub port: u16,
    /// True if the running backend was not spawned by us
    pub adopted: bool,
    /// Automatic and explicit restarts so far
    pub restart_count: u32,
    /// Most recent health probe
    pub last_health_check: Option<HealthReport>,
}

/// Starts, monitors and stops the backend process
pub struct LifecycleManager {
    config: LifecycleConfig,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<LifecycleState>,
    events: broadcast::Sender<LifecycleEvent>,
    tracked: Arc<RwLock<Tracked>>,
}

impl fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("command", &self.config.command)
            .field("port", &self.config.port)
            .field("state", &self.state())
            .finish()
    }
}

impl LifecycleManager {
    /// Manager probing the configured HTTP liveness path.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: LifecycleConfig) -> LifecycleResult<Self> {
        let probe = HttpProbe::new(config.health_url(), config.probe_timeout())?;
        Ok(Self::with_probe(config, Arc::new(probe)))
    }

    /// Manager with a caller-supplied probe.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn with_probe(config: LifecycleConfig, probe: Arc<dyn HealthProbe>) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(LifecycleState::Stopped);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let tracked = Arc::new(RwLock::new(Tracked::default()));

        let supervisor = Supervisor::new(
            config.clone(),
            probe,
            state_tx,
            events.clone(),
            Arc::clone(&tracked),
        );
        tokio::spawn(supervisor.run(command_rx));

        Self {
            config,
            commands,
            state,
            events,
            tracked,
        }
    }

    /// Begin startup in the background and return immediately
    pub fn start_parallel(&self) -> StartHandle {
        let (tx, rx) = oneshot::channel();
        // On a closed channel the sender is dropped and wait() reports Failed
        let _ = self.commands.send(Command::Start(tx));
        StartHandle { rx }
    }

    /// Start and wait for the outcome
    pub async fn start(&self) -> StartOutcome {
        self.start_parallel().wait().await
    }

    /// Stop the backend: SIGTERM, grace period, then kill. Idempotent.
    pub async fn stop(&self) -> LifecycleResult<ShutdownOutcome> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Stop(tx))
            .map_err(|_| LifecycleError::SupervisorGone)?;
        rx.await.map_err(|_| LifecycleError::SupervisorGone)?
    }

    /// Stop then start
    pub async fn restart(&self) -> StartOutcome {
        let (tx, rx) = oneshot::channel();
        let _ = self.commands.send(Command::Restart(tx));
        StartHandle { rx }.wait().await
    }

    /// Current state
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// State change notifications
    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.clone()
    }

    /// Lifecycle events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Configuration in use
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Status snapshot
    pub fn status(&self) -> LifecycleStatus {
        let tracked = self.tracked.read();
        LifecycleStatus {
            state: self.state(),
            pid: tracked.pid,
            host: self.config.probe_host().to_string(),
            port: self.config.port,
            adopted: tracked.adopted,
            restart_count: tracked.restart_count,
            last_health_check: tracked.last_health_check.clone(),
        }
    }
}
