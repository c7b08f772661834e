use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use super::shell::{ShellWindow, StartupReport, WindowExit};
use crate::core::{Config, ShellBridge};

/// Where the web UI is loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowTarget {
    DevServer(Url),
    Bundled(PathBuf),
}

impl WindowTarget {
    pub fn url(&self) -> Result<Url> {
        match self {
            WindowTarget::DevServer(url) => Ok(url.clone()),
            WindowTarget::Bundled(path) => {
                let absolute = path
                    .canonicalize()
                    .with_context(|| format!("Bundled UI not found at {}", path.display()))?;
                Url::from_file_path(&absolute)
                    .map_err(|_| anyhow!("Cannot build file URL for {}", absolute.display()))
            }
        }
    }
}

/// Launches a URL in something that can show it
pub trait UrlOpener {
    fn open(&self, url: &Url) -> Result<()>;
}

/// The user's default browser
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl UrlOpener for SystemBrowser {
    fn open(&self, url: &Url) -> Result<()> {
        open::that(url.as_str()).map_err(|e| anyhow!("Could not open browser: {}", e))
    }
}

/// Opens the web UI in a browser; there is no close signal, so the window is
/// considered open until the user quits the shell.
pub struct BrowserWindow<O> {
    primary: WindowTarget,
    fallback: PathBuf,
    bridge: ShellBridge,
    opener: O,
    http: reqwest::Client,
}

impl<O: UrlOpener> BrowserWindow<O> {
    pub fn new(config: &Config, opener: O) -> Result<Self> {
        let fallback = config.window.bundled_index.clone();
        let primary = if config.is_dev() {
            let url = Url::parse(&config.window.dev_url)
                .with_context(|| format!("Invalid dev_url '{}'", config.window.dev_url))?;
            WindowTarget::DevServer(url)
        } else {
            WindowTarget::Bundled(fallback.clone())
        };

        Ok(Self {
            primary,
            fallback,
            bridge: ShellBridge::from_config(config),
            opener,
            http: reqwest::Client::new(),
        })
    }

    pub fn primary(&self) -> &WindowTarget {
        &self.primary
    }

    async fn dev_server_reachable(&self, url: &Url) -> bool {
        self.http
            .get(url.as_str())
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .is_ok()
    }

    /// Load the primary target, falling back to the bundled copy
    pub async fn load(&self) -> Result<WindowTarget> {
        let primary_ok = match &self.primary {
            WindowTarget::DevServer(url) => {
                let reachable = self.dev_server_reachable(url).await;
                if !reachable {
                    tracing::warn!("Dev server {} is not reachable", url);
                }
                reachable
            }
            WindowTarget::Bundled(_) => true,
        };

        open_with_fallback(
            &self.primary,
            primary_ok,
            &self.fallback,
            &self.bridge,
            &self.opener,
        )
    }
}

/// Try the primary target (when usable), then the local built copy
pub fn open_with_fallback<O: UrlOpener>(
    primary: &WindowTarget,
    primary_ok: bool,
    fallback: &Path,
    bridge: &ShellBridge,
    opener: &O,
) -> Result<WindowTarget> {
    if primary_ok {
        match primary.url().and_then(|url| opener.open(&bridge.decorate(&url))) {
            Ok(()) => {
                tracing::info!("Window loaded {:?}", primary);
                return Ok(primary.clone());
            }
            Err(e) => tracing::warn!("Window failed to load {:?}: {}", primary, e),
        }
    }

    let fallback = WindowTarget::Bundled(fallback.to_path_buf());
    if &fallback == primary && primary_ok {
        return Err(anyhow!("Failed to load the UI from {}", fallback_path(&fallback)));
    }

    tracing::info!("Falling back to local build at {}", fallback_path(&fallback));
    let url = fallback.url()?;
    opener.open(&bridge.decorate(&url))?;
    Ok(fallback)
}

fn fallback_path(target: &WindowTarget) -> String {
    match target {
        WindowTarget::Bundled(path) => path.display().to_string(),
        WindowTarget::DevServer(url) => url.to_string(),
    }
}

impl<O: UrlOpener> ShellWindow for BrowserWindow<O> {
    async fn run(&mut self, report: &StartupReport) -> Result<WindowExit> {
        if let Some(warning) = report.warning() {
            eprintln!("Warning: {}", warning);
        }

        let loaded = self.load().await?;
        match &loaded {
            WindowTarget::DevServer(url) => println!("UI opened from {}", url),
            WindowTarget::Bundled(path) => println!("UI opened from {}", path.display()),
        }
        println!("Backend: {}", self.bridge.backend_url());
        println!("Press Ctrl+C to quit");

        tokio::signal::ctrl_c().await?;
        Ok(WindowExit::QuitRequested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingOpener {
        opened: RefCell<Vec<String>>,
        fail_scheme: Option<&'static str>,
    }

    impl UrlOpener for RecordingOpener {
        fn open(&self, url: &Url) -> Result<()> {
            if Some(url.scheme()) == self.fail_scheme {
                return Err(anyhow!("refused"));
            }
            self.opened.borrow_mut().push(url.to_string());
            Ok(())
        }
    }

    fn bundle() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let index = dir.path().join("index.html");
        std::fs::write(&index, "<html></html>").unwrap();
        (dir, index)
    }

    fn dev() -> WindowTarget {
        WindowTarget::DevServer(Url::parse("http://localhost:3000").unwrap())
    }

    #[test]
    fn dev_server_loads_with_backend_query() {
        let (_dir, index) = bundle();
        let opener = RecordingOpener::default();
        let bridge = ShellBridge::from_config(&Config::default());

        let loaded = open_with_fallback(&dev(), true, &index, &bridge, &opener).unwrap();
        assert_eq!(loaded, dev());
        let opened = opener.opened.borrow();
        assert_eq!(opened.len(), 1);
        assert!(opened[0].starts_with("http://localhost:3000/?backendUrl="));
    }

    #[test]
    fn unreachable_dev_server_falls_back_to_bundle() {
        let (_dir, index) = bundle();
        let opener = RecordingOpener::default();
        let bridge = ShellBridge::from_config(&Config::default());

        let loaded = open_with_fallback(&dev(), false, &index, &bridge, &opener).unwrap();
        assert_eq!(loaded, WindowTarget::Bundled(index));
        let opened = opener.opened.borrow();
        assert_eq!(opened.len(), 1);
        assert!(opened[0].starts_with("file://"));
    }

    #[test]
    fn load_failure_falls_back_to_bundle() {
        let (_dir, index) = bundle();
        let opener = RecordingOpener {
            fail_scheme: Some("http"),
            ..Default::default()
        };
        let bridge = ShellBridge::from_config(&Config::default());

        let loaded = open_with_fallback(&dev(), true, &index, &bridge, &opener).unwrap();
        assert!(matches!(loaded, WindowTarget::Bundled(_)));
    }

    #[test]
    fn missing_bundle_is_an_error() {
        let opener = RecordingOpener::default();
        let bridge = ShellBridge::from_config(&Config::default());
        let missing = PathBuf::from("/nope/build/index.html");

        let err = open_with_fallback(&dev(), false, &missing, &bridge, &opener).unwrap_err();
        assert!(err.to_string().contains("Bundled UI not found"));
        assert!(opener.opened.borrow().is_empty());
    }

    #[test]
    fn failing_bundle_does_not_retry_itself() {
        let (_dir, index) = bundle();
        let opener = RecordingOpener {
            fail_scheme: Some("file"),
            ..Default::default()
        };
        let bridge = ShellBridge::from_config(&Config::default());
        let primary = WindowTarget::Bundled(index.clone());

        assert!(open_with_fallback(&primary, true, &index, &bridge, &opener).is_err());
    }
}
