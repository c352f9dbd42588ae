//! Spawning and terminating the backend child process

use crate::error::{LifecycleError, LifecycleResult};
use forest_core::LifecycleConfig;
use serde::Serialize;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// How a stop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownOutcome {
    /// The process exited within the grace period
    Graceful,
    /// The process ignored the termination signal and was killed
    Forced,
    /// The process had already exited
    AlreadyExited,
    /// Nothing was running
    NotRunning,
}

/// A spawned backend process
#[derive(Debug)]
pub struct BackendProcess {
    child: Child,
    pid: u32,
}

impl BackendProcess {
    /// Spawn the configured command with stdout/stderr forwarded to tracing
    pub fn spawn(config: &LifecycleConfig) -> LifecycleResult<Self> {
        let args = config.render_args();
        let mut child = Command::new(&config.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LifecycleError::Spawn {
                command: config.command.clone(),
                source,
            })?;
        let pid = child.id().unwrap_or_default();

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(stdout, pid, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(stderr, pid, "stderr"));
        }

        info!(
            target: "forest::lifecycle",
            pid,
            command = %config.command,
            args = ?args,
            "Spawned backend process"
        );
        Ok(Self { child, pid })
    }

    /// OS process id
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Exit status if the process has exited
    pub fn try_wait(&mut self) -> LifecycleResult<Option<ExitStatus>> {
        Ok(self.child.try_wait()?)
    }

    /// Wait for the process to exit; cancel safe
    pub async fn wait(&mut self) -> LifecycleResult<ExitStatus> {
        Ok(self.child.wait().await?)
    }

    /// Ask the process to exit, then kill it if it is still alive after `grace`
    pub async fn terminate(&mut self, grace: Duration) -> LifecycleResult<ShutdownOutcome> {
        if self.child.try_wait()?.is_some() {
            return Ok(ShutdownOutcome::AlreadyExited);
        }

        self.request_exit()?;
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                info!(target: "forest::lifecycle", pid = self.pid, %status, "Backend exited");
                Ok(ShutdownOutcome::Graceful)
            }
            Err(_) => {
                warn!(
                    target: "forest::lifecycle",
                    pid = self.pid,
                    grace_ms = grace.as_millis() as u64,
                    "Backend ignored termination signal, killing"
                );
                self.child.kill().await?;
                Ok(ShutdownOutcome::Forced)
            }
        }
    }

    #[cfg(unix)]
    fn request_exit(&mut self) -> LifecycleResult<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = i32::try_from(self.pid).map_err(|_| LifecycleError::Signal {
            pid: self.pid,
            message: "pid out of range".to_string(),
        })?;
        kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(|e| LifecycleError::Signal {
            pid: self.pid,
            message: e.to_string(),
        })
    }

    #[cfg(not(unix))]
    fn request_exit(&mut self) -> LifecycleResult<()> {
        Ok(self.child.start_kill()?)
    }
}

async fn forward_output<R>(stream: R, pid: u32, name: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "forest::lifecycle", pid, stream = name, "{}", line);
    }
}
