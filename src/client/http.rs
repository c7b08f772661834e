use anyhow::{anyhow, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::core::session::Ack;
use crate::core::{
    ChatMessage, Config, InputHistoryEntry, NewInputHistory, NewSession, SendMessage, Session,
};

/// REST client for the chat backend
#[derive(Debug, Clone)]
pub struct InAppClient {
    base_url: String,
    api: String,
    probe_path: String,
    probe_timeout: Duration,
    client: Client,
}

impl InAppClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let api = format!("{}{}", base_url, crate::core::config::API_PREFIX);
        Self {
            base_url,
            api,
            probe_path: format!("{}/", crate::core::config::API_PREFIX),
            probe_timeout: Duration::from_secs(1),
            client: Client::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut client = Self::new(config.backend_url());
        client.api = format!("{}{}", client.base_url, config.backend.api_prefix);
        client.probe_path = config.backend.probe_path.clone();
        client.probe_timeout = config.probe_timeout();
        client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One-shot liveness probe: any HTTP response counts as running
    pub async fn probe(&self) -> Result<()> {
        let url = format!("{}{}", self.base_url, self.probe_path);
        let response = self
            .client
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| anyhow!("Backend not reachable at {}: {}", self.base_url, e))?;
        tracing::debug!("Probe {} answered {}", url, response.status());
        Ok(())
    }

    pub async fn is_backend_running(&self) -> bool {
        self.probe().await.is_ok()
    }

    // ─── Sessions ───

    pub async fn create_session(&self, title: &str, model: &str) -> Result<Session> {
        let request = NewSession {
            title: title.to_string(),
            model: model.to_string(),
        };
        tracing::debug!("POST /sessions {:?}", request);

        let response = self
            .client
            .post(format!("{}/sessions", self.api))
            .json(&request)
            .send()
            .await?;
        let session: Session = parse(response, "create session").await?;

        tracing::info!("Created session {}", session.id);
        Ok(session)
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let response = self
            .client
            .get(format!("{}/sessions", self.api))
            .send()
            .await?;
        parse(response, "list sessions").await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Session> {
        let response = self
            .client
            .get(format!("{}/sessions/{}", self.api, session_id))
            .send()
            .await?;
        parse(response, "get session").await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/sessions/{}", self.api, session_id))
            .send()
            .await?;
        let _: Ack = parse(response, "delete session").await?;
        tracing::info!("Deleted session {}", session_id);
        Ok(())
    }

    /// The backend reads these as query parameters, not a JSON body
    pub async fn update_session_stats(
        &self,
        session_id: &str,
        questions_asked: u32,
        duration: &str,
    ) -> Result<()> {
        let response = self
            .client
            .patch(format!("{}/sessions/{}/update-stats", self.api, session_id))
            .query(&[
                ("questions_asked", questions_asked.to_string()),
                ("duration", duration.to_string()),
            ])
            .send()
            .await?;
        let _: Ack = parse(response, "update session stats").await?;
        Ok(())
    }

    // ─── Chat ───

    /// Returns the assistant's reply
    pub async fn send_message(&self, request: &SendMessage) -> Result<ChatMessage> {
        tracing::debug!(
            "POST /chat session={} type={:?} chars={} image={}",
            request.session_id,
            request.message_type,
            request.message.len(),
            request.image_data.is_some()
        );
        let response = self
            .client
            .post(format!("{}/chat", self.api))
            .json(request)
            .send()
            .await?;
        parse(response, "send message").await
    }

    pub async fn get_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let response = self
            .client
            .get(format!("{}/chat/{}", self.api, session_id))
            .send()
            .await?;
        parse(response, "fetch messages").await
    }

    /// Returns how many messages the backend removed
    pub async fn delete_messages(&self, session_id: &str) -> Result<u64> {
        let response = self
            .client
            .delete(format!("{}/chat/{}", self.api, session_id))
            .send()
            .await?;
        let ack: Ack = parse(response, "delete messages").await?;
        Ok(ack.deleted_count.unwrap_or(0))
    }

    // ─── Input history ───

    pub async fn save_input(&self, session_id: &str, input: &str) -> Result<()> {
        let request = NewInputHistory {
            session_id: session_id.to_string(),
            input: input.to_string(),
        };
        let response = self
            .client
            .post(format!("{}/input-history", self.api))
            .json(&request)
            .send()
            .await?;
        let _: Ack = parse(response, "save input").await?;
        Ok(())
    }

    /// Most recent inputs across all sessions, newest first
    pub async fn list_input_history(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/input-history", self.api))
            .send()
            .await?;
        parse(response, "fetch input history").await
    }

    pub async fn session_input_history(&self, session_id: &str) -> Result<Vec<InputHistoryEntry>> {
        let response = self
            .client
            .get(format!("{}/input-history/{}", self.api, session_id))
            .send()
            .await?;
        parse(response, "fetch session input history").await
    }
}

/// Decode a success body, or turn the backend's `detail` into the error message
async fn parse<T: DeserializeOwned>(response: Response, action: &str) -> Result<T> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if !status.is_success() {
        let detail = error_detail(&body).unwrap_or_else(|| status.to_string());
        tracing::error!("Failed to {}: {} - {}", action, status, detail);
        return Err(anyhow!("{}", detail));
    }

    serde_json::from_str(&body).map_err(|e| anyhow!("Failed to parse {} response: {}", action, e))
}

/// FastAPI-style `{"detail": "..."}`; validation errors carry a list instead
fn error_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(detail) => Some(detail.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_is_extracted_from_error_body() {
        assert_eq!(
            error_detail(r#"{"detail": "Session not found"}"#).as_deref(),
            Some("Session not found")
        );
        assert_eq!(error_detail("Internal Server Error"), None);
        assert_eq!(error_detail(r#"{"message": "x"}"#), None);
    }

    #[test]
    fn from_config_respects_api_prefix() {
        let mut config = Config::default();
        config.backend.api_prefix = "/v2".into();
        config.backend.port = 9999;
        let client = InAppClient::from_config(&config);
        assert_eq!(client.base_url(), "http://localhost:9999");
        assert_eq!(client.api, "http://localhost:9999/v2");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = InAppClient::new("http://127.0.0.1:8001/");
        assert_eq!(client.base_url(), "http://127.0.0.1:8001");
        assert_eq!(client.api, "http://127.0.0.1:8001/api");
    }
}
