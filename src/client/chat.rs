use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::attachment::ImageAttachment;
use crate::core::{ChatMessage, MessageKind, Role, SendMessage, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
    created: Instant,
}

/// Toast-style notifications; the newest live one is shown
#[derive(Debug)]
pub struct Notices {
    queue: VecDeque<Notice>,
    ttl: Duration,
}

impl Notices {
    const KEEP: usize = 20;

    pub fn new(ttl: Duration) -> Self {
        Self {
            queue: VecDeque::new(),
            ttl,
        }
    }

    pub fn push(&mut self, level: NoticeLevel, text: impl Into<String>) {
        let text = text.into();
        match level {
            NoticeLevel::Error => tracing::warn!("{}", text),
            _ => tracing::debug!("{}", text),
        }
        self.queue.push_back(Notice {
            level,
            text,
            created: Instant::now(),
        });
        while self.queue.len() > Self::KEEP {
            self.queue.pop_front();
        }
    }

    pub fn success(&mut self, text: impl Into<String>) {
        self.push(NoticeLevel::Success, text);
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.push(NoticeLevel::Info, text);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.push(NoticeLevel::Error, text);
    }

    pub fn current(&self) -> Option<&Notice> {
        self.queue
            .back()
            .filter(|notice| notice.created.elapsed() < self.ttl)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.queue.iter()
    }
}

/// State of the chat panel for one session
#[derive(Debug)]
pub struct ChatState {
    pub session: Session,
    pub model: String,
    messages: Vec<ChatMessage>,
    pub input: String,
    image: Option<ImageAttachment>,
    loading: bool,
    thread_loaded: bool,
    recall: Vec<String>,
    recall_pos: Option<usize>,
    opened_at: DateTime<Utc>,
    /// Minutes already on the session when it was opened
    prior_minutes: i64,
}

impl ChatState {
    pub fn new(session: Session, model: String, now: DateTime<Utc>) -> Self {
        Self {
            model,
            messages: Vec::new(),
            input: String::new(),
            image: None,
            loading: false,
            thread_loaded: false,
            recall: Vec::new(),
            recall_pos: None,
            opened_at: now,
            prior_minutes: parse_minutes(&session.duration),
            session,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn image(&self) -> Option<&ImageAttachment> {
        self.image.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_thread_loaded(&self) -> bool {
        self.thread_loaded
    }

    /// Take the backend's copy of the thread, keeping whatever arrived since
    /// the panel opened that the backend copy does not already hold
    pub fn load_thread(&mut self, thread: Vec<ChatMessage>) {
        let opened_at = self.opened_at;
        let since_open = |m: &ChatMessage| m.timestamp >= opened_at;
        let pending: Vec<ChatMessage> = std::mem::take(&mut self.messages)
            .into_iter()
            .filter(|m| {
                !thread.iter().any(|t| {
                    t.id == m.id
                        || (m.is_local()
                            && since_open(t)
                            && t.role == m.role
                            && t.content == m.content)
                })
            })
            .collect();

        self.messages = thread;
        self.messages.extend(pending);
        self.thread_loaded = true;
    }

    pub fn set_recall(&mut self, inputs: Vec<String>) {
        self.recall = inputs;
        self.recall_pos = None;
    }

    pub fn attach_image(&mut self, attachment: ImageAttachment) {
        self.image = Some(attachment);
    }

    pub fn remove_image(&mut self) -> Option<ImageAttachment> {
        self.image.take()
    }

    pub fn can_send(&self) -> bool {
        !self.loading && (!self.input.trim().is_empty() || self.image.is_some())
    }

    /// Append the user's message optimistically and hand back the request to send.
    /// Blank input with no image, or a send already in flight, is a no-op.
    pub fn begin_send(&mut self, now: DateTime<Utc>) -> Option<SendMessage> {
        if !self.can_send() {
            return None;
        }

        let content = std::mem::take(&mut self.input).trim().to_string();
        let image_data = self.image.as_ref().map(|img| img.data_url().to_string());
        let message_type = if image_data.is_some() {
            MessageKind::Image
        } else {
            MessageKind::Text
        };

        self.messages.push(ChatMessage::optimistic_user(
            &self.session.id,
            content.clone(),
            image_data.clone(),
            now,
        ));
        if !content.is_empty() {
            self.recall.push(content.clone());
        }
        self.recall_pos = None;
        self.loading = true;

        Some(SendMessage {
            session_id: self.session.id.clone(),
            message: content,
            model: self.model.clone(),
            message_type,
            image_data,
            audio_data: None,
        })
    }

    /// Apply the backend's answer. The preview clears either way.
    pub fn complete_send(&mut self, result: Result<ChatMessage>, notices: &mut Notices) {
        self.loading = false;
        self.image = None;

        match result {
            Ok(reply) => self.messages.push(reply),
            Err(e) => notices.error(format!("Failed to send message: {}", e)),
        }
    }

    /// Step back through earlier inputs (Up arrow)
    pub fn recall_previous(&mut self) {
        if self.recall.is_empty() {
            return;
        }
        let pos = match self.recall_pos {
            Some(0) => 0,
            Some(pos) => pos - 1,
            None => self.recall.len() - 1,
        };
        self.recall_pos = Some(pos);
        self.input = self.recall[pos].clone();
    }

    /// Step forward again (Down arrow); past the newest entry clears the input
    pub fn recall_next(&mut self) {
        match self.recall_pos {
            Some(pos) if pos + 1 < self.recall.len() => {
                self.recall_pos = Some(pos + 1);
                self.input = self.recall[pos + 1].clone();
            }
            Some(_) => {
                self.recall_pos = None;
                self.input.clear();
            }
            None => {}
        }
    }

    /// User messages in the thread. Until the backend thread has loaded the
    /// count cannot drop below what the session already recorded.
    pub fn questions_asked(&self) -> u32 {
        let counted = self
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .count() as u32;
        if self.thread_loaded {
            counted
        } else {
            counted.max(self.session.questions_asked)
        }
    }

    /// Total time on the session, including earlier openings
    pub fn elapsed_display(&self, now: DateTime<Utc>) -> String {
        format_minutes(now - self.opened_at + chrono::Duration::minutes(self.prior_minutes))
    }
}

/// Session duration the way the backend stores it: "45 mins"
pub fn format_minutes(elapsed: chrono::Duration) -> String {
    let mins = elapsed.num_minutes().max(0);
    if mins == 1 {
        "1 min".to_string()
    } else {
        format!("{} mins", mins)
    }
}

/// A century; keeps `chrono::Duration::minutes` in range
const MAX_MINUTES: i64 = 100 * 365 * 24 * 60;

/// Inverse of `format_minutes`; anything unparseable counts as zero
pub fn parse_minutes(duration: &str) -> i64 {
    duration
        .split_whitespace()
        .next()
        .and_then(|n| n.parse::<i64>().ok())
        .unwrap_or(0)
        .clamp(0, MAX_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn session() -> Session {
        serde_json::from_str(r#"{"id": "s1", "title": "Mock", "date": "2025-01-30T14:30:00"}"#)
            .unwrap()
    }

    fn state() -> ChatState {
        ChatState::new(session(), "GPT-5.2".into(), Utc::now())
    }

    fn reply(content: &str) -> ChatMessage {
        ChatMessage {
            id: "srv-1".into(),
            session_id: "s1".into(),
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            message_type: MessageKind::Text,
            image_url: None,
            audio_url: None,
        }
    }

    fn image() -> ImageAttachment {
        ImageAttachment::from_bytes("screen.png", &[1, 2, 3]).unwrap()
    }

    #[test]
    fn blank_input_without_image_is_noop() {
        let mut chat = state();
        chat.input = "   \n ".into();
        assert!(chat.begin_send(Utc::now()).is_none());
        assert!(chat.messages().is_empty());
        assert!(!chat.is_loading());
        assert_eq!(chat.input, "   \n ");
    }

    #[test]
    fn successful_send_appends_user_then_assistant() {
        let mut chat = state();
        let mut notices = Notices::new(Duration::from_secs(4));
        chat.input = "  Tell me about yourself ".into();

        let request = chat.begin_send(Utc::now()).unwrap();
        assert_eq!(request.message, "Tell me about yourself");
        assert_eq!(request.message_type, MessageKind::Text);
        assert!(chat.is_loading());
        assert!(chat.input.is_empty());
        assert_eq!(chat.messages().len(), 1);

        chat.complete_send(Ok(reply("Start with your background.")), &mut notices);

        let roles: Vec<Role> = chat.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert!(!chat.is_loading());
        assert!(notices.is_empty());
        assert_eq!(chat.questions_asked(), 1);
    }

    #[test]
    fn failed_send_keeps_user_message_and_notifies_once() {
        let mut chat = state();
        let mut notices = Notices::new(Duration::from_secs(4));
        chat.input = "hello".into();
        chat.begin_send(Utc::now()).unwrap();

        chat.complete_send(Err(anyhow!("Backend not reachable")), &mut notices);

        assert_eq!(chat.messages().len(), 1);
        assert_eq!(notices.len(), 1);
        let notice = notices.current().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.text.contains("Backend not reachable"));
    }

    #[test]
    fn second_send_while_loading_is_ignored() {
        let mut chat = state();
        chat.input = "one".into();
        chat.begin_send(Utc::now()).unwrap();
        chat.input = "two".into();
        assert!(chat.begin_send(Utc::now()).is_none());
        assert_eq!(chat.messages().len(), 1);
    }

    #[test]
    fn image_only_send_is_allowed_and_preview_clears_on_completion() {
        let mut chat = state();
        let mut notices = Notices::new(Duration::from_secs(4));
        chat.attach_image(image());
        assert!(chat.image().is_some());

        let request = chat.begin_send(Utc::now()).unwrap();
        assert_eq!(request.message_type, MessageKind::Image);
        assert!(request.image_data.as_deref().unwrap().starts_with("data:image/png;base64,"));
        // still visible while the request is in flight
        assert!(chat.image().is_some());

        chat.complete_send(Ok(reply("Nice diagram")), &mut notices);
        assert!(chat.image().is_none());
        assert_eq!(chat.messages()[0].message_type, MessageKind::Image);
    }

    #[test]
    fn preview_clears_on_failed_completion_and_on_removal() {
        let mut chat = state();
        let mut notices = Notices::new(Duration::from_secs(4));
        chat.attach_image(image());
        chat.begin_send(Utc::now()).unwrap();
        chat.complete_send(Err(anyhow!("boom")), &mut notices);
        assert!(chat.image().is_none());

        chat.attach_image(image());
        assert!(chat.remove_image().is_some());
        assert!(chat.image().is_none());
        assert!(!chat.can_send());
    }

    #[test]
    fn recall_walks_previous_inputs() {
        let mut chat = state();
        chat.set_recall(vec!["first".into(), "second".into()]);

        chat.recall_previous();
        assert_eq!(chat.input, "second");
        chat.recall_previous();
        assert_eq!(chat.input, "first");
        chat.recall_previous();
        assert_eq!(chat.input, "first");
        chat.recall_next();
        assert_eq!(chat.input, "second");
        chat.recall_next();
        assert!(chat.input.is_empty());
    }

    #[test]
    fn elapsed_is_rendered_in_minutes() {
        let opened = Utc::now();
        let chat = ChatState::new(session(), "GPT-5.2".into(), opened);
        assert_eq!(chat.elapsed_display(opened + chrono::Duration::minutes(45)), "45 mins");
        assert_eq!(format_minutes(chrono::Duration::seconds(70)), "1 min");
        assert_eq!(format_minutes(chrono::Duration::seconds(-5)), "0 mins");
    }

    #[test]
    fn reopened_session_keeps_prior_duration() {
        let mut reopened = session();
        reopened.duration = "30 mins".into();
        let opened = Utc::now();
        let chat = ChatState::new(reopened, "GPT-5.2".into(), opened);
        assert_eq!(chat.elapsed_display(opened + chrono::Duration::minutes(5)), "35 mins");
        assert_eq!(parse_minutes("n/a"), 0);
        assert_eq!(parse_minutes("1 min"), 1);
    }

    #[test]
    fn absurd_stored_duration_is_clamped() {
        let mut odd = session();
        odd.duration = format!("{} mins", i64::MAX);
        let opened = Utc::now();
        let chat = ChatState::new(odd, "GPT-5.2".into(), opened);
        assert_eq!(chat.elapsed_display(opened), format!("{} mins", MAX_MINUTES));
        assert_eq!(parse_minutes("-40 mins"), 0);
    }

    #[test]
    fn stored_question_count_holds_until_thread_loads() {
        let mut earlier = session();
        earlier.questions_asked = 8;
        let mut chat = ChatState::new(earlier, "GPT-5.2".into(), Utc::now());
        assert_eq!(chat.questions_asked(), 8);

        chat.load_thread(Vec::new());
        assert!(chat.is_thread_loaded());
        assert_eq!(chat.questions_asked(), 0);
    }

    #[test]
    fn late_thread_merges_with_messages_sent_meanwhile() {
        let opened = Utc::now();
        let mut chat = ChatState::new(session(), "GPT-5.2".into(), opened);
        let mut notices = Notices::new(Duration::from_secs(4));

        chat.input = "new question".into();
        chat.begin_send(opened).unwrap();
        chat.complete_send(Ok(reply("new answer")), &mut notices);

        let old_question = ChatMessage {
            id: "srv-0".into(),
            role: Role::User,
            content: "old question".into(),
            timestamp: opened - chrono::Duration::minutes(10),
            ..reply("")
        };
        let saved_question = ChatMessage {
            id: "srv-q".into(),
            role: Role::User,
            content: "new question".into(),
            timestamp: opened,
            ..reply("")
        };
        chat.load_thread(vec![old_question, saved_question, reply("new answer")]);

        let ids: Vec<&str> = chat.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["srv-0", "srv-q", "srv-1"]);
        assert_eq!(chat.questions_asked(), 2);
    }

    #[test]
    fn expired_notice_is_hidden() {
        let mut notices = Notices::new(Duration::from_millis(0));
        notices.info("gone");
        assert!(notices.current().is_none());
        assert_eq!(notices.len(), 1);
    }
}
