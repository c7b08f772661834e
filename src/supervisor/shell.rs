use anyhow::Result;
use std::future::Future;

use super::{BackendSpawner, BackendStatus, LivenessProbe, Readiness, Supervisor};

/// How a window session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowExit {
    /// The last window was closed
    Closed,
    /// Explicit quit (Ctrl+C, quit key)
    QuitRequested,
}

/// What the window should know about backend startup
#[derive(Debug, Clone)]
pub struct StartupReport {
    pub status: Result<BackendStatus, String>,
    pub readiness: Option<Readiness>,
}

impl StartupReport {
    /// A one-line warning when the backend is probably not usable
    pub fn warning(&self) -> Option<String> {
        match (&self.status, &self.readiness) {
            (Err(e), _) => Some(format!("Failed to start backend: {}", e)),
            (Ok(BackendStatus::NotRunning), _) => {
                Some("Backend is not running and spawning is disabled".to_string())
            }
            (_, Some(Readiness::Exited(exit))) => {
                Some(format!("Backend exited during startup ({})", exit))
            }
            (_, Some(Readiness::TimedOut { waited })) => Some(format!(
                "Backend did not answer within {}s; requests may fail",
                waited.as_secs()
            )),
            _ => None,
        }
    }
}

pub trait ShellWindow {
    fn run(&mut self, report: &StartupReport) -> impl Future<Output = Result<WindowExit>>;
}

/// Decides whether a resident shell reopens its window
pub trait Activation {
    /// `true` to reopen, `false` to quit
    fn wait(&mut self) -> impl Future<Output = Result<bool>>;
}

/// Waits for Enter on stdin (reopen) or Ctrl+C / EOF (quit)
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinActivation;

impl Activation for StdinActivation {
    async fn wait(&mut self) -> Result<bool> {
        use tokio::io::AsyncBufReadExt;

        println!("Window closed. Press Enter to reopen, Ctrl+C to quit.");
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        tokio::select! {
            line = lines.next_line() => Ok(line?.is_some()),
            _ = tokio::signal::ctrl_c() => Ok(false),
        }
    }
}

/// Application lifecycle: backend up, window open, backend down
pub struct Shell<P, S: BackendSpawner> {
    supervisor: Supervisor<P, S>,
    stay_resident: bool,
}

impl<P: LivenessProbe, S: BackendSpawner> Shell<P, S> {
    pub fn new(supervisor: Supervisor<P, S>, stay_resident: bool) -> Self {
        Self {
            supervisor,
            stay_resident,
        }
    }

    pub fn supervisor(&self) -> &Supervisor<P, S> {
        &self.supervisor
    }

    /// Probe, spawn if needed, and wait for readiness
    pub async fn start_backend(&mut self) -> StartupReport {
        let status = self
            .supervisor
            .ensure_backend()
            .await
            .map_err(|e| format!("{:#}", e));

        let readiness = match status {
            Ok(BackendStatus::Spawned { .. }) => Some(self.supervisor.wait_until_ready().await),
            _ => None,
        };

        StartupReport { status, readiness }
    }

    /// Run until the user quits. The backend is stopped whenever the last
    /// window closes; a resident shell restarts it on reopen.
    pub async fn run<W: ShellWindow, A: Activation>(
        &mut self,
        window: &mut W,
        activation: &mut A,
    ) -> Result<()> {
        loop {
            let report = self.start_backend().await;
            if let Some(warning) = report.warning() {
                tracing::warn!("{}", warning);
            }

            let exit = match window.run(&report).await {
                Ok(exit) => exit,
                Err(e) => {
                    self.on_quit();
                    return Err(e);
                }
            };

            match exit {
                WindowExit::QuitRequested => {
                    self.on_quit();
                    return Ok(());
                }
                WindowExit::Closed => {
                    if !self.on_all_windows_closed() {
                        return Ok(());
                    }
                    if !activation.wait().await? {
                        self.on_quit();
                        return Ok(());
                    }
                    tracing::info!("Reopening window");
                }
            }
        }
    }

    /// Stops the backend; returns whether the shell stays resident
    pub fn on_all_windows_closed(&mut self) -> bool {
        self.supervisor.shutdown();
        self.stay_resident
    }

    pub fn on_quit(&mut self) {
        self.supervisor.shutdown();
    }
}
