//! Supervisor task behind [`LifecycleManager`](crate::LifecycleManager)
//!
//! Serializes commands, child-exit notifications and health ticks in one
//! `select!` loop, so the child process has exactly one owner.

use crate::error::{LifecycleError, LifecycleResult};
use crate::manager::{HealthReport, LifecycleEvent, LifecycleState, StartOutcome};
use crate::probe::{port_in_use, HealthProbe};
use crate::process::{BackendProcess, ShutdownOutcome};
use chrono::Utc;
use forest_core::LifecycleConfig;
use parking_lot::RwLock;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Process facts shared with the manager handle for status snapshots
#[derive(Debug, Default)]
pub(crate) struct Tracked {
    pub(crate) pid: Option<u32>,
    pub(crate) adopted: bool,
    pub(crate) restart_count: u32,
    pub(crate) last_health_check: Option<HealthReport>,
}

pub(crate) enum Command {
    Start(oneshot::Sender<StartOutcome>),
    Stop(oneshot::Sender<LifecycleResult<ShutdownOutcome>>),
    Restart(oneshot::Sender<StartOutcome>),
}

/// Owns the backend process; runs until the command channel closes
pub(crate) struct Supervisor {
    config: LifecycleConfig,
    probe: Arc<dyn HealthProbe>,
    state: watch::Sender<LifecycleState>,
    events: broadcast::Sender<LifecycleEvent>,
    tracked: Arc<RwLock<Tracked>>,
    process: Option<BackendProcess>,
    adopted: bool,
}

async fn wait_exit(process: &mut Option<BackendProcess>) -> LifecycleResult<ExitStatus> {
    match process {
        Some(process) => process.wait().await,
        None => std::future::pending().await,
    }
}

impl Supervisor {
    pub(crate) fn new(
        config: LifecycleConfig,
        probe: Arc<dyn HealthProbe>,
        state: watch::Sender<LifecycleState>,
        events: broadcast::Sender<LifecycleEvent>,
        tracked: Arc<RwLock<Tracked>>,
    ) -> Self {
        Self {
            config,
            probe,
            state,
            events,
            tracked,
            process: None,
            adopted: false,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let period = self
            .config
            .health_check_interval()
            .max(Duration::from_millis(1));
        let mut health = tokio::time::interval_at(Instant::now() + period, period);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let running = self.is_running();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => {
                        if let Err(err) = self.stop().await {
                            warn!(target: "forest::lifecycle", error = %err, "Stop on shutdown failed");
                        }
                        break;
                    }
                },
                status = wait_exit(&mut self.process) => self.on_exit(status).await,
                _ = health.tick(), if running => self.check_health().await,
            }
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Start(reply) => {
                let outcome = self.start().await;
                let _ = reply.send(outcome);
            }
            Command::Stop(reply) => {
                let outcome = self.stop().await;
                let _ = reply.send(outcome);
            }
            Command::Restart(reply) => {
                let outcome = self.restart("requested").await;
                let _ = reply.send(outcome);
            }
        }
    }

    fn is_running(&self) -> bool {
        self.process.is_some() || self.adopted
    }

    fn set_state(&self, state: LifecycleState) {
        self.state.send_replace(state);
    }

    fn publish(&self, event: LifecycleEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn start(&mut self) -> StartOutcome {
        if self.is_running() {
            return StartOutcome::AlreadyRunning;
        }

        let policy = self.config.start_retry.clone();
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            self.publish(LifecycleEvent::Starting { attempt });
            match self.start_once().await {
                Ok(outcome) => return outcome,
                Err(err) => {
                    warn!(
                        target: "forest::lifecycle",
                        attempt,
                        max_attempts,
                        error = %err,
                        "Backend startup attempt failed"
                    );
                    self.publish(LifecycleEvent::StartFailed {
                        attempt,
                        error: err.to_string(),
                    });
                    if attempt >= max_attempts {
                        error!(target: "forest::lifecycle", attempts = attempt, "Backend startup failed");
                        let error = if attempt > 1 {
                            LifecycleError::RetriesExhausted {
                                attempts: attempt,
                                last: Box::new(err),
                            }
                        } else {
                            err
                        };
                        return StartOutcome::Failed { error };
                    }
                    tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn start_once(&mut self) -> LifecycleResult<StartOutcome> {
        self.set_state(LifecycleState::Starting);
        let result = self.launch().await;
        if result.is_err() {
            if let Some(mut process) = self.process.take() {
                let _ = process.terminate(self.config.shutdown_grace()).await;
            }
            self.tracked.write().pid = None;
            self.set_state(LifecycleState::Stopped);
        }
        result
    }

    async fn launch(&mut self) -> LifecycleResult<StartOutcome> {
        let data_dir = self.config.resolved_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(|source| LifecycleError::DataDir {
                path: data_dir.clone(),
                source,
            })?;

        let host = self.config.probe_host().to_string();
        if port_in_use(&host, self.config.port, self.config.probe_timeout()).await {
            info!(
                target: "forest::lifecycle",
                host = %host,
                port = self.config.port,
                "Port already serving, adopting existing backend"
            );
            self.adopted = true;
            self.tracked.write().adopted = true;
            self.set_state(LifecycleState::Running);
            self.publish(LifecycleEvent::Adopted {
                port: self.config.port,
            });
            return Ok(StartOutcome::AlreadyRunning);
        }

        let process = BackendProcess::spawn(&self.config)?;
        let pid = process.pid();
        self.process = Some(process);
        self.tracked.write().pid = Some(pid);

        self.wait_ready().await?;

        info!(target: "forest::lifecycle", pid, port = self.config.port, "Backend ready");
        self.set_state(LifecycleState::Running);
        self.publish(LifecycleEvent::Started { pid });
        Ok(StartOutcome::Started { pid })
    }

    async fn wait_ready(&mut self) -> LifecycleResult<()> {
        let started = Instant::now();
        let deadline = started + self.config.startup_timeout();
        loop {
            if let Some(process) = self.process.as_mut() {
                if let Some(status) = process.try_wait()? {
                    return Err(LifecycleError::ExitedDuringStartup {
                        status: status.to_string(),
                    });
                }
            }
            if self.probe.check().await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(LifecycleError::ReadinessTimeout {
                    url: self.config.health_url(),
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(self.config.startup_poll()).await;
        }
    }

    async fn stop(&mut self) -> LifecycleResult<ShutdownOutcome> {
        if !self.is_running() {
            return Ok(ShutdownOutcome::NotRunning);
        }

        self.set_state(LifecycleState::Stopping);
        let result = match self.process.take() {
            Some(mut process) => process.terminate(self.config.shutdown_grace()).await,
            // Adopted backends are not ours to kill
            None => Ok(ShutdownOutcome::NotRunning),
        };
        self.adopted = false;
        {
            let mut tracked = self.tracked.write();
            tracked.pid = None;
            tracked.adopted = false;
        }
        self.set_state(LifecycleState::Stopped);

        if let Ok(outcome) = &result {
            info!(target: "forest::lifecycle", outcome = ?outcome, "Backend stopped");
            self.publish(LifecycleEvent::Stopped { outcome: *outcome });
        }
        result
    }

    async fn restart(&mut self, reason: &str) -> StartOutcome {
        info!(target: "forest::lifecycle", reason, "Restarting backend");
        self.publish(LifecycleEvent::Restarting {
            reason: reason.to_string(),
        });
        self.tracked.write().restart_count += 1;
        if let Err(err) = self.stop().await {
            warn!(target: "forest::lifecycle", error = %err, "Stop before restart failed");
        }
        self.start().await
    }

    async fn on_exit(&mut self, status: LifecycleResult<ExitStatus>) {
        self.process = None;
        self.tracked.write().pid = None;
        self.set_state(LifecycleState::Stopped);

        let code = match &status {
            Ok(status) => status.code(),
            Err(_) => None,
        };
        warn!(target: "forest::lifecycle", code = ?code, "Backend exited unexpectedly");
        self.publish(LifecycleEvent::Exited { code });

        if self.config.auto_restart {
            tokio::time::sleep(self.config.restart_delay()).await;
            let outcome = self.restart("unexpected exit").await;
            if let StartOutcome::Failed { error } = outcome {
                error!(target: "forest::lifecycle", error = %error, "Automatic restart failed");
            }
        }
    }

    async fn check_health(&mut self) {
        let result = self.probe.check().await;
        let report = HealthReport {
            timestamp: Utc::now(),
            healthy: result.is_ok(),
            detail: result.as_ref().err().cloned(),
        };
        self.tracked.write().last_health_check = Some(report);

        if let Err(detail) = result {
            warn!(target: "forest::lifecycle", detail = %detail, "Backend health check failed");
            self.publish(LifecycleEvent::Unhealthy { detail });
            if self.config.auto_restart {
                let outcome = self.restart("failed health check").await;
                if let StartOutcome::Failed { error } = outcome {
                    error!(target: "forest::lifecycle", error = %error, "Automatic restart failed");
                }
            }
        }
    }
}
