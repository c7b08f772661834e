use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use super::{BackendProcess, BackendSpawner, ExitInfo};
use crate::core::config::WindowKind;
use crate::core::Config;

/// Where the child's stdout and stderr go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOutput {
    /// Share the shell's terminal
    Inherit,
    /// Append both streams to a file
    File(PathBuf),
    /// Pipe both streams and re-emit every line through tracing
    Trace,
}

/// How to start the backend: uvicorn from source in development, the packaged
/// executable in production
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub output: BackendOutput,
}

impl LaunchCommand {
    pub fn from_config(config: &Config) -> Self {
        let launch = &config.launch;
        let host = config.backend.host.clone();
        let port = config.backend.port.to_string();
        // the terminal window owns the tty, so the child must not write to it
        let output = match (&launch.log_file, config.window.kind) {
            (Some(path), _) => BackendOutput::File(path.clone()),
            (None, WindowKind::Terminal) => BackendOutput::Trace,
            (None, WindowKind::Browser) => BackendOutput::Inherit,
        };

        if config.is_dev() {
            LaunchCommand {
                program: PathBuf::from(&launch.python),
                args: vec![
                    "-m".into(),
                    "uvicorn".into(),
                    launch.app.clone(),
                    "--host".into(),
                    host,
                    "--port".into(),
                    port,
                ],
                cwd: Some(launch.backend_dir.clone()),
                output,
            }
        } else {
            LaunchCommand {
                program: launch.executable.clone(),
                args: vec!["--host".into(), host, "--port".into(), port],
                cwd: None,
                output,
            }
        }
    }

    pub fn with_output(mut self, output: BackendOutput) -> Self {
        self.output = output;
        self
    }

    fn stdio(&self) -> Result<(Stdio, Stdio)> {
        match &self.output {
            BackendOutput::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("Failed to open backend log {}", path.display()))?;
                let err = file.try_clone()?;
                Ok((Stdio::from(file), Stdio::from(err)))
            }
            BackendOutput::Trace => Ok((Stdio::piped(), Stdio::piped())),
            BackendOutput::Inherit => Ok((Stdio::inherit(), Stdio::inherit())),
        }
    }
}

fn forward_lines<R>(reader: R, stream: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim_end();
            if !line.is_empty() {
                tracing::info!(target: "in_desktop::backend", "[{}] {}", stream, line);
            }
        }
    });
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        if let Some(cwd) = &self.cwd {
            write!(f, " (in {})", cwd.display())?;
        }
        Ok(())
    }
}

/// Spawns the backend with tokio's process API
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSpawner;

impl BackendSpawner for TokioSpawner {
    type Process = ChildBackend;

    fn spawn(&mut self, command: &LaunchCommand) -> Result<ChildBackend> {
        let (stdout, stderr) = command.stdio()?;

        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| anyhow!("Failed to spawn '{}': {}", command.program.display(), e))?;

        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, "stderr");
        }

        Ok(ChildBackend { child })
    }
}

pub struct ChildBackend {
    child: tokio::process::Child,
}

impl BackendProcess for ChildBackend {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_exit(&mut self) -> Result<Option<ExitInfo>> {
        Ok(self
            .child
            .try_wait()?
            .map(|status| ExitInfo { code: status.code() }))
    }

    fn kill(&mut self) -> Result<()> {
        self.child.start_kill()?;
        Ok(())
    }
}
