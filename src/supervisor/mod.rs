//! Backend supervision for the desktop shell.
//!
//! The shell probes for a backend once, spawns one if nothing answered, then
//! polls until the backend is serving (or the child dies, or time runs out)
//! before the window opens. A child we spawned is killed exactly once when the
//! shell closes, whichever exit path gets there first.

pub mod process;
pub mod shell;
pub mod window;

use anyhow::Result;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::client::InAppClient;
pub use process::{BackendOutput, ChildBackend, LaunchCommand, TokioSpawner};
pub use shell::{Activation, Shell, ShellWindow, StartupReport, StdinActivation, WindowExit};
pub use window::{BrowserWindow, SystemBrowser, UrlOpener, WindowTarget};

/// Anything that can answer "is a backend serving right now?"
pub trait LivenessProbe {
    /// `Ok` when something answered; any error counts as not running
    fn probe(&self) -> impl Future<Output = Result<()>>;
}

impl LivenessProbe for InAppClient {
    fn probe(&self) -> impl Future<Output = Result<()>> {
        InAppClient::probe(self)
    }
}

pub trait BackendSpawner {
    type Process: BackendProcess;

    fn spawn(&mut self, command: &LaunchCommand) -> Result<Self::Process>;
}

pub trait BackendProcess {
    fn id(&self) -> Option<u32>;
    /// `Some` once the process has exited
    fn try_exit(&mut self) -> Result<Option<ExitInfo>>;
    fn kill(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "terminated by signal"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    /// Something was already serving; nothing spawned
    AlreadyRunning,
    Spawned { pid: Option<u32> },
    /// Probe failed and spawning is disabled in config
    NotRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready { waited: Duration },
    Exited(ExitInfo),
    TimedOut { waited: Duration },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReadinessOptions {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for ReadinessOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_millis(250),
        }
    }
}

pub struct Supervisor<P, S: BackendSpawner> {
    probe: P,
    spawner: S,
    command: LaunchCommand,
    spawn_enabled: bool,
    readiness: ReadinessOptions,
    child: Option<S::Process>,
}

impl<P: LivenessProbe, S: BackendSpawner> Supervisor<P, S> {
    pub fn new(probe: P, spawner: S, command: LaunchCommand) -> Self {
        Self {
            probe,
            spawner,
            command,
            spawn_enabled: true,
            readiness: ReadinessOptions::default(),
            child: None,
        }
    }

    pub fn with_readiness(mut self, readiness: ReadinessOptions) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_spawn_enabled(mut self, enabled: bool) -> Self {
        self.spawn_enabled = enabled;
        self
    }

    pub fn command(&self) -> &LaunchCommand {
        &self.command
    }

    /// True while a child we started is held
    pub fn owns_backend(&self) -> bool {
        self.child.is_some()
    }

    pub fn child_id(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// Probe once; spawn once if the probe failed. Spawn errors are logged and
    /// returned, never retried.
    pub async fn ensure_backend(&mut self) -> Result<BackendStatus> {
        if let Some(child) = &self.child {
            return Ok(BackendStatus::Spawned { pid: child.id() });
        }

        match self.probe.probe().await {
            Ok(()) => {
                tracing::info!("Backend already running, not spawning");
                return Ok(BackendStatus::AlreadyRunning);
            }
            Err(e) => tracing::info!("Backend not running ({})", e),
        }

        if !self.spawn_enabled {
            tracing::warn!("Backend spawning disabled; continuing without a backend");
            return Ok(BackendStatus::NotRunning);
        }

        tracing::info!("Starting backend: {}", self.command);
        match self.spawner.spawn(&self.command) {
            Ok(child) => {
                let pid = child.id();
                tracing::info!("Spawned backend process with PID: {}", pid.unwrap_or(0));
                self.child = Some(child);
                Ok(BackendStatus::Spawned { pid })
            }
            Err(e) => {
                tracing::error!("Failed to start backend: {:#}", e);
                Err(e)
            }
        }
    }

    /// Poll the probe until the backend answers, our child exits, or the
    /// timeout passes.
    pub async fn wait_until_ready(&mut self) -> Readiness {
        let started = Instant::now();
        let ReadinessOptions { timeout, interval } = self.readiness;

        loop {
            if self.probe.probe().await.is_ok() {
                let waited = started.elapsed();
                tracing::info!("Backend ready after {:.1}s", waited.as_secs_f64());
                return Readiness::Ready { waited };
            }

            if let Some(child) = self.child.as_mut() {
                match child.try_exit() {
                    Ok(Some(exit)) => {
                        tracing::warn!("Backend process exited before becoming ready: {}", exit);
                        self.child = None;
                        return Readiness::Exited(exit);
                    }
                    Ok(None) => {}
                    Err(e) => tracing::debug!("Could not poll backend process: {}", e),
                }
            }

            let waited = started.elapsed();
            if waited >= timeout {
                tracing::warn!(
                    "Backend did not become ready within {:.1}s",
                    timeout.as_secs_f64()
                );
                return Readiness::TimedOut { waited };
            }

            sleep(interval.min(timeout - waited)).await;
        }
    }

    /// Kill the child we spawned, if any. Later calls are no-ops.
    pub fn shutdown(&mut self) -> bool {
        let Some(mut child) = self.child.take() else {
            return false;
        };

        tracing::info!("Stopping backend server (PID {})", child.id().unwrap_or(0));
        match child.try_exit() {
            Ok(Some(exit)) => {
                tracing::info!("Backend process already exited with {}", exit);
                return false;
            }
            Ok(None) | Err(_) => {}
        }
        if let Err(e) = child.kill() {
            tracing::error!("Failed to stop backend: {}", e);
        }
        true
    }
}

impl<P, S: BackendSpawner> Drop for Supervisor<P, S> {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                tracing::error!("Failed to stop backend on drop: {}", e);
            }
        }
    }
}
