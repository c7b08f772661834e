use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Host the backend binds to and the UI talks to.
pub const BACKEND_HOST: &str = "localhost";
/// Fixed backend port.
pub const BACKEND_PORT: u16 = 8001;
/// REST namespace on the backend.
pub const API_PREFIX: &str = "/api";

pub const DEFAULT_MODEL: &str = "GPT-5.2";
pub const DEFAULT_SESSION_TITLE: &str = "New Interview Session";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub launch: LaunchConfig,
    pub window: WindowConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    pub api_prefix: String,
    /// Path hit by the liveness probe, relative to the base URL
    pub probe_path: String,
    pub probe_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// Development when built with debug assertions, production otherwise
    Auto,
    Development,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    pub mode: LaunchMode,
    /// Skip spawning entirely and only probe
    pub spawn: bool,
    /// Development: interpreter used to run uvicorn
    pub python: String,
    /// Development: backend source directory (working dir of the child)
    pub backend_dir: PathBuf,
    /// Development: ASGI app passed to uvicorn
    pub app: String,
    /// Production: packaged backend executable
    pub executable: PathBuf,
    pub ready_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Redirect the child's stdout/stderr to this file. Without one the
    /// terminal window pipes them into the log strip.
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    Terminal,
    Browser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub kind: WindowKind,
    pub title: String,
    pub dev_url: String,
    /// Built copy of the web UI, used in production and as the fallback
    pub bundled_index: PathBuf,
    /// Keep the shell alive after the last window closes
    pub stay_resident: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub model: String,
    pub models: Vec<String>,
    pub session_title: String,
    pub notification_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: BackendConfig::default(),
            launch: LaunchConfig::default(),
            window: WindowConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            host: BACKEND_HOST.to_string(),
            port: BACKEND_PORT,
            api_prefix: API_PREFIX.to_string(),
            probe_path: format!("{}/", API_PREFIX),
            probe_timeout_ms: 1000,
        }
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        let resources = resources_dir();
        let exe = if cfg!(target_os = "windows") {
            "server.exe"
        } else {
            "server"
        };

        LaunchConfig {
            mode: LaunchMode::Auto,
            spawn: true,
            python: "python".to_string(),
            backend_dir: PathBuf::from("backend"),
            app: "server:app".to_string(),
            executable: resources.join("backend").join(exe),
            ready_timeout_secs: 30,
            poll_interval_ms: 250,
            log_file: None,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            kind: WindowKind::Terminal,
            title: "In - AI Interview Assistant".to_string(),
            dev_url: "http://localhost:3000".to_string(),
            bundled_index: resources_dir().join("build").join("index.html"),
            stay_resident: cfg!(target_os = "macos"),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        UiConfig {
            model: DEFAULT_MODEL.to_string(),
            models: vec![DEFAULT_MODEL.to_string()],
            session_title: DEFAULT_SESSION_TITLE.to_string(),
            notification_secs: 4,
        }
    }
}

/// Directory holding packaged resources: next to the executable, falling back to cwd
fn resources_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.join("resources")))
        .unwrap_or_else(|| PathBuf::from("resources"))
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "in-assistant", "in-desktop")
}

/// Location of config.toml, if the platform has a config dir
pub fn config_file_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = match config_file_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Config::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(path) = config_file_path() {
            self.save_to(&path)?;
        }
        Ok(())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `IN_BACKEND_URL` overrides host and port, `IN_DEV` forces the launch mode
    fn apply_env(&mut self) {
        if let Ok(raw) = std::env::var("IN_BACKEND_URL") {
            match url::Url::parse(&raw) {
                Ok(parsed) => {
                    if let Some(host) = parsed.host_str() {
                        self.backend.host = host.to_string();
                    }
                    if let Some(port) = parsed.port_or_known_default() {
                        self.backend.port = port;
                    }
                }
                Err(e) => tracing::warn!("Ignoring IN_BACKEND_URL '{}': {}", raw, e),
            }
        }

        if let Ok(raw) = std::env::var("IN_DEV") {
            self.launch.mode = match raw.as_str() {
                "1" | "true" | "yes" => LaunchMode::Development,
                _ => LaunchMode::Production,
            };
        }
    }

    /// `http://host:port`, no trailing slash
    pub fn backend_url(&self) -> String {
        format!("http://{}:{}", self.backend.host, self.backend.port)
    }

    pub fn is_dev(&self) -> bool {
        match self.launch.mode {
            LaunchMode::Auto => cfg!(debug_assertions),
            LaunchMode::Development => true,
            LaunchMode::Production => false,
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.probe_timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.launch.ready_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.launch.poll_interval_ms.max(10))
    }
}
