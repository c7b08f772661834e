use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Interview session as stored by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub date: DateTime<Utc>,
    #[serde(default = "default_duration")]
    pub duration: String,
    #[serde(default)]
    pub questions_asked: u32,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(rename = "type")]
    pub role: Role,
    pub content: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, deserialize_with = "nullable_kind")]
    pub message_type: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

impl ChatMessage {
    /// Locally created user message, shown before the backend answers
    pub fn optimistic_user(
        session_id: &str,
        content: String,
        image_url: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let message_type = if image_url.is_some() {
            MessageKind::Image
        } else {
            MessageKind::Text
        };
        ChatMessage {
            id: format!("local-{}", uuid::Uuid::new_v4()),
            session_id: session_id.to_string(),
            role: Role::User,
            content,
            timestamp: now,
            message_type,
            image_url,
            audio_url: None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.id.starts_with("local-")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputHistoryEntry {
    #[serde(default)]
    pub id: String,
    pub session_id: String,
    pub input: String,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewSession {
    pub title: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub session_id: String,
    pub message: String,
    pub model: String,
    pub message_type: MessageKind,
    pub image_data: Option<String>,
    pub audio_data: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInputHistory {
    pub session_id: String,
    pub input: String,
}

/// `{"success": true, "deleted_count": N}` style acknowledgements
#[derive(Debug, Clone, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub deleted_count: Option<u64>,
}

fn default_model() -> String {
    super::config::DEFAULT_MODEL.to_string()
}

fn default_duration() -> String {
    "0 mins".to_string()
}

fn nullable_kind<'de, D>(deserializer: D) -> Result<MessageKind, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<MessageKind>::deserialize(deserializer)?.unwrap_or_default())
}

/// Backend timestamps come from `datetime.utcnow()` and usually carry no offset
pub mod timestamp {
    use super::*;

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
    }

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn session_accepts_naive_backend_timestamps() {
        let json = r#"{
            "id": "abc",
            "title": "Technical Interview - Google",
            "date": "2025-01-30T14:30:00.123456",
            "duration": "45 mins",
            "questionsAsked": 8,
            "model": "GPT-5.2",
            "createdAt": "2025-01-30T14:30:00",
            "updatedAt": null
        }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.questions_asked, 8);
        assert_eq!(session.date.hour(), 14);
        assert!(session.created_at.is_some());
        assert!(session.updated_at.is_none());
    }

    #[test]
    fn session_accepts_zoned_timestamps_and_missing_fields() {
        let json = r#"{"id": "1", "title": "t", "date": "2025-01-29T10:00:00Z"}"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.date.day(), 29);
        assert_eq!(session.duration, "0 mins");
        assert_eq!(session.model, "GPT-5.2");
    }

    #[test]
    fn message_reads_type_and_null_message_type() {
        let json = r#"{
            "id": "m1", "sessionId": "s1", "type": "assistant", "content": "hi",
            "timestamp": "2025-01-30T14:31:00", "messageType": null, "imageUrl": null
        }"#;
        let message: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.message_type, MessageKind::Text);
        assert!(message.image_url.is_none());
    }

    #[test]
    fn send_message_uses_backend_field_names() {
        let request = SendMessage {
            session_id: "s1".into(),
            message: "hello".into(),
            model: "GPT-5.2".into(),
            message_type: MessageKind::Image,
            image_data: Some("data:image/png;base64,AAAA".into()),
            audio_data: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["sessionId"], "s1");
        assert_eq!(value["messageType"], "image");
        assert_eq!(value["imageData"], "data:image/png;base64,AAAA");
        assert!(value["audioData"].is_null());
    }

    #[test]
    fn optimistic_message_is_marked_local() {
        let message = ChatMessage::optimistic_user("s1", "q".into(), None, Utc::now());
        assert!(message.is_local());
        assert_eq!(message.role, Role::User);
        assert_eq!(message.message_type, MessageKind::Text);
    }

    #[test]
    fn rejects_garbage_timestamp() {
        assert!(timestamp::parse("yesterday").is_none());
    }
}
