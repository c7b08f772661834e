use serde::Serialize;

use super::Config;

/// What the shell tells the rendered UI about its environment
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellBridge {
    backend_url: String,
    pub platform: &'static str,
    pub is_dev: bool,
}

impl ShellBridge {
    pub fn from_config(config: &Config) -> Self {
        Self {
            backend_url: config.backend_url(),
            platform: std::env::consts::OS,
            is_dev: config.is_dev(),
        }
    }

    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    /// Append the backend URL to a page URL so the web UI can pick it up
    pub fn decorate(&self, page: &url::Url) -> url::Url {
        let mut page = page.clone();
        page.query_pairs_mut()
            .append_pair("backendUrl", &self.backend_url);
        page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_configured_backend() {
        let mut config = Config::default();
        config.backend.port = 9001;
        let bridge = ShellBridge::from_config(&config);
        assert_eq!(bridge.backend_url(), "http://localhost:9001");
        assert_eq!(bridge.platform, std::env::consts::OS);
    }

    #[test]
    fn decorate_appends_query() {
        let bridge = ShellBridge::from_config(&Config::default());
        let page = url::Url::parse("http://localhost:3000/").unwrap();
        let decorated = bridge.decorate(&page);
        assert_eq!(
            decorated.as_str(),
            "http://localhost:3000/?backendUrl=http%3A%2F%2Flocalhost%3A8001"
        );
    }
}
