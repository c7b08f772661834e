use anyhow::Result;
use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

use super::attachment::ImageAttachment;
use super::chat::{ChatState, Notices};
use super::http::InAppClient;
use crate::core::{ChatMessage, Config, InputHistoryEntry, Session};
use crate::supervisor::WindowExit;
use crate::utils::tui_writer::LogEntry;

const MAX_LOGS: usize = 200;

/// Results of background requests, delivered back to the UI loop
#[derive(Debug)]
pub enum UiEvent {
    SessionCreated(Result<Session>),
    SessionsListed(Result<Vec<Session>>),
    SessionDeleted {
        session_id: String,
        result: Result<()>,
    },
    ThreadLoaded {
        session_id: String,
        result: Result<Vec<ChatMessage>>,
    },
    RecallLoaded {
        session_id: String,
        result: Result<Vec<InputHistoryEntry>>,
    },
    MessageReplied {
        session_id: String,
        result: Result<ChatMessage>,
    },
    ImageRead(Result<ImageAttachment>),
    StatsSaved(Result<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Home,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    Model,
    Title,
}

#[derive(Debug, Clone)]
pub struct SettingsForm {
    pub field: SettingsField,
    pub model_index: usize,
    pub title: String,
}

#[derive(Debug)]
pub struct HistoryView {
    pub sessions: Vec<Session>,
    pub selected: usize,
    pub loading: bool,
}

#[derive(Debug)]
pub enum Modal {
    History(HistoryView),
    Settings(SettingsForm),
    AttachImage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit(WindowExit),
}

pub struct App {
    pub config: Config,
    client: InAppClient,
    events: mpsc::UnboundedSender<UiEvent>,
    pub screen: Screen,
    pub modal: Option<Modal>,
    pub chat: Option<ChatState>,
    pub notices: Notices,
    pub logs: VecDeque<LogEntry>,
    pub starting_session: bool,
}

impl App {
    pub fn new(
        config: Config,
        client: InAppClient,
        events: mpsc::UnboundedSender<UiEvent>,
    ) -> Self {
        let notices = Notices::new(Duration::from_secs(config.ui.notification_secs));
        Self {
            config,
            client,
            events,
            screen: Screen::Home,
            modal: None,
            chat: None,
            notices,
            logs: VecDeque::new(),
            starting_session: false,
        }
    }

    pub fn backend_url(&self) -> &str {
        self.client.base_url()
    }

    pub fn push_log(&mut self, entry: LogEntry) {
        self.logs.push_back(entry);
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    fn spawn_request<T, F>(&self, request: F, wrap: impl FnOnce(Result<T>) -> UiEvent + Send + 'static)
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = request.await;
            let _ = events.send(wrap(result));
        });
    }

    // ─── Actions ───

    pub fn start_session(&mut self) {
        if self.starting_session {
            return;
        }
        self.starting_session = true;

        let client = self.client.clone();
        let title = self.config.ui.session_title.clone();
        let model = self.config.ui.model.clone();
        tracing::info!("Starting new session...");
        self.spawn_request(
            async move { client.create_session(&title, &model).await },
            UiEvent::SessionCreated,
        );
    }

    pub fn open_chat(&mut self, session: Session) {
        let session_id = session.id.clone();
        let model = session.model.clone();
        self.chat = Some(ChatState::new(session, model, Utc::now()));
        self.screen = Screen::Chat;

        let client = self.client.clone();
        let id = session_id.clone();
        let event_id = session_id.clone();
        self.spawn_request(
            async move { client.get_messages(&id).await },
            move |result| UiEvent::ThreadLoaded {
                session_id: event_id,
                result,
            },
        );

        let client = self.client.clone();
        let id = session_id.clone();
        self.spawn_request(
            async move { client.session_input_history(&id).await },
            move |result| UiEvent::RecallLoaded { session_id, result },
        );
    }

    pub fn send_message(&mut self) {
        let Some(chat) = self.chat.as_mut() else {
            return;
        };
        let Some(request) = chat.begin_send(Utc::now()) else {
            return;
        };

        if !request.message.is_empty() {
            let client = self.client.clone();
            let session_id = request.session_id.clone();
            let input = request.message.clone();
            tokio::spawn(async move {
                if let Err(e) = client.save_input(&session_id, &input).await {
                    tracing::warn!("Failed to save input history: {}", e);
                }
            });
        }

        let client = self.client.clone();
        let session_id = request.session_id.clone();
        self.spawn_request(
            async move { client.send_message(&request).await },
            move |result| UiEvent::MessageReplied { session_id, result },
        );
    }

    /// Leave the chat panel; stats are posted in the background
    pub fn end_session(&mut self) {
        if let Some((session_id, questions, duration)) = self.take_session_stats() {
            let client = self.client.clone();
            self.spawn_request(
                async move {
                    client
                        .update_session_stats(&session_id, questions, &duration)
                        .await
                },
                UiEvent::StatsSaved,
            );
            self.notices
                .info("Session ended. All conversations saved to history.");
        }
        self.screen = Screen::Home;
    }

    fn take_session_stats(&mut self) -> Option<(String, u32, String)> {
        let chat = self.chat.take()?;
        Some((
            chat.session_id().to_string(),
            chat.questions_asked(),
            chat.elapsed_display(Utc::now()),
        ))
    }

    /// Post stats for an open chat before the window goes away
    pub async fn flush_session_stats(&mut self) {
        let Some((session_id, questions, duration)) = self.take_session_stats() else {
            return;
        };
        let update = self
            .client
            .update_session_stats(&session_id, questions, &duration);
        match tokio::time::timeout(Duration::from_secs(2), update).await {
            Ok(Ok(())) => tracing::info!("Saved stats for session {}", session_id),
            Ok(Err(e)) => tracing::warn!("Failed to save session stats: {}", e),
            Err(_) => tracing::warn!("Timed out saving session stats"),
        }
    }

    pub fn open_history(&mut self) {
        self.modal = Some(Modal::History(HistoryView {
            sessions: Vec::new(),
            selected: 0,
            loading: true,
        }));
        let client = self.client.clone();
        self.spawn_request(
            async move { client.list_sessions().await },
            UiEvent::SessionsListed,
        );
    }

    pub fn open_settings(&mut self) {
        let mut models = self.config.ui.models.clone();
        if !models.contains(&self.config.ui.model) {
            models.push(self.config.ui.model.clone());
            self.config.ui.models = models.clone();
        }
        let model_index = models
            .iter()
            .position(|m| m == &self.config.ui.model)
            .unwrap_or(0);
        self.modal = Some(Modal::Settings(SettingsForm {
            field: SettingsField::Model,
            model_index,
            title: self.config.ui.session_title.clone(),
        }));
    }

    fn save_settings(&mut self, form: SettingsForm) {
        if let Some(model) = self.config.ui.models.get(form.model_index) {
            self.config.ui.model = model.clone();
        }
        let title = form.title.trim();
        if !title.is_empty() {
            self.config.ui.session_title = title.to_string();
        }
        match self.config.save() {
            Ok(()) => self.notices.success("Settings saved"),
            Err(e) => self.notices.error(format!("Failed to save settings: {}", e)),
        }
    }

    fn load_session(&mut self, session: Session) {
        match &self.chat {
            // already open; rebuilding would lose an in-flight send
            Some(chat) if chat.session_id() == session.id => self.screen = Screen::Chat,
            Some(_) => {
                self.end_session();
                self.open_chat(session);
            }
            None => self.open_chat(session),
        }
        self.notices.success("Session loaded successfully!");
    }

    fn delete_session(&mut self, session_id: String) {
        let client = self.client.clone();
        let id = session_id.clone();
        self.spawn_request(
            async move { client.delete_session(&id).await },
            move |result| UiEvent::SessionDeleted { session_id, result },
        );
    }

    fn read_image(&mut self, path: String) {
        self.spawn_request(
            async move { ImageAttachment::read(path.trim()).await },
            UiEvent::ImageRead,
        );
    }

    // ─── Background results ───

    pub fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::SessionCreated(result) => {
                self.starting_session = false;
                match result {
                    Ok(session) => {
                        self.open_chat(session);
                        self.notices
                            .success("Session started! AI Assistant is now active.");
                    }
                    Err(e) => self
                        .notices
                        .error(format!("Failed to start session: {}", e)),
                }
            }
            UiEvent::SessionsListed(result) => match result {
                Ok(sessions) => {
                    if let Some(Modal::History(view)) = self.modal.as_mut() {
                        view.sessions = sessions;
                        view.selected = 0;
                        view.loading = false;
                    }
                }
                Err(e) => {
                    if let Some(Modal::History(view)) = self.modal.as_mut() {
                        view.loading = false;
                    }
                    self.notices
                        .error(format!("Failed to load sessions: {}", e));
                }
            },
            UiEvent::SessionDeleted { session_id, result } => match result {
                Ok(()) => {
                    if let Some(Modal::History(view)) = self.modal.as_mut() {
                        view.sessions.retain(|s| s.id != session_id);
                        view.selected = view.selected.min(view.sessions.len().saturating_sub(1));
                    }
                    if self.chat.as_ref().map(|c| c.session_id()) == Some(session_id.as_str()) {
                        self.chat = None;
                        self.screen = Screen::Home;
                    }
                    self.notices.success("Session deleted");
                }
                Err(e) => self
                    .notices
                    .error(format!("Failed to delete session: {}", e)),
            },
            UiEvent::ThreadLoaded { session_id, result } => {
                let Some(chat) = self.chat.as_mut().filter(|c| c.session_id() == session_id)
                else {
                    return;
                };
                match result {
                    Ok(messages) => chat.load_thread(messages),
                    Err(e) => self
                        .notices
                        .error(format!("Failed to load messages: {}", e)),
                }
            }
            UiEvent::RecallLoaded { session_id, result } => {
                let Some(chat) = self.chat.as_mut().filter(|c| c.session_id() == session_id)
                else {
                    return;
                };
                match result {
                    Ok(entries) => chat.set_recall(entries.into_iter().map(|e| e.input).collect()),
                    Err(e) => tracing::warn!("Failed to load input history: {}", e),
                }
            }
            UiEvent::MessageReplied { session_id, result } => {
                match self.chat.as_mut().filter(|c| c.session_id() == session_id) {
                    Some(chat) => chat.complete_send(result, &mut self.notices),
                    None => {
                        if let Err(e) = result {
                            self.notices
                                .error(format!("Failed to send message: {}", e));
                        }
                    }
                }
            }
            UiEvent::ImageRead(result) => match result {
                Ok(attachment) => {
                    if let Some(chat) = self.chat.as_mut() {
                        self.notices
                            .info(format!("Attached {}", attachment.file_name()));
                        chat.attach_image(attachment);
                    }
                }
                Err(e) => self
                    .notices
                    .error(format!("Failed to attach image: {}", e)),
            },
            UiEvent::StatsSaved(result) => {
                if let Err(e) = result {
                    self.notices
                        .error(format!("Failed to update session: {}", e));
                }
            }
        }
    }

    // ─── Keys ───

    pub fn handle_key(&mut self, key: KeyEvent) -> Flow {
        if key.kind != KeyEventKind::Press {
            return Flow::Continue;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        if ctrl && key.code == KeyCode::Char('c') {
            return Flow::Exit(WindowExit::QuitRequested);
        }

        if let Some(modal) = self.modal.take() {
            self.handle_modal_key(modal, key);
            return Flow::Continue;
        }

        match self.screen {
            Screen::Home => self.handle_home_key(key),
            Screen::Chat => {
                self.handle_chat_key(key, ctrl);
                Flow::Continue
            }
        }
    }

    fn handle_home_key(&mut self, key: KeyEvent) -> Flow {
        match key.code {
            KeyCode::Char('n') | KeyCode::Enter => self.start_session(),
            KeyCode::Char('h') => self.open_history(),
            KeyCode::Char('s') => self.open_settings(),
            KeyCode::Char('q') | KeyCode::Esc => return Flow::Exit(WindowExit::Closed),
            _ => {}
        }
        Flow::Continue
    }

    fn handle_chat_key(&mut self, key: KeyEvent, ctrl: bool) {
        if ctrl {
            match key.code {
                KeyCode::Char('o') => self.open_history(),
                KeyCode::Char('p') => self.open_settings(),
                KeyCode::Char('a') => self.modal = Some(Modal::AttachImage(String::new())),
                KeyCode::Char('x') => {
                    if let Some(image) = self.chat.as_mut().and_then(|c| c.remove_image()) {
                        self.notices.info(format!("Removed {}", image.file_name()));
                    }
                }
                KeyCode::Char('u') => {
                    if let Some(chat) = self.chat.as_mut() {
                        chat.input.clear();
                    }
                }
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Esc => self.end_session(),
            KeyCode::Enter => self.send_message(),
            KeyCode::Up => {
                if let Some(chat) = self.chat.as_mut() {
                    chat.recall_previous();
                }
            }
            KeyCode::Down => {
                if let Some(chat) = self.chat.as_mut() {
                    chat.recall_next();
                }
            }
            KeyCode::Backspace => {
                if let Some(chat) = self.chat.as_mut() {
                    chat.input.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some(chat) = self.chat.as_mut() {
                    chat.input.push(c);
                }
            }
            _ => {}
        }
    }

    fn handle_modal_key(&mut self, modal: Modal, key: KeyEvent) {
        match modal {
            Modal::History(mut view) => match key.code {
                KeyCode::Esc | KeyCode::Char('q') => {}
                KeyCode::Up | KeyCode::Char('k') => {
                    view.selected = view.selected.saturating_sub(1);
                    self.modal = Some(Modal::History(view));
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    if view.selected + 1 < view.sessions.len() {
                        view.selected += 1;
                    }
                    self.modal = Some(Modal::History(view));
                }
                KeyCode::Enter => match view.sessions.get(view.selected).cloned() {
                    Some(session) => self.load_session(session),
                    None => self.modal = Some(Modal::History(view)),
                },
                KeyCode::Char('d') | KeyCode::Delete => {
                    if let Some(session) = view.sessions.get(view.selected) {
                        self.delete_session(session.id.clone());
                    }
                    self.modal = Some(Modal::History(view));
                }
                KeyCode::Char('r') => self.open_history(),
                _ => self.modal = Some(Modal::History(view)),
            },
            Modal::Settings(mut form) => match key.code {
                KeyCode::Esc => {}
                KeyCode::Enter => self.save_settings(form),
                KeyCode::Up | KeyCode::Down | KeyCode::Tab => {
                    form.field = match form.field {
                        SettingsField::Model => SettingsField::Title,
                        SettingsField::Title => SettingsField::Model,
                    };
                    self.modal = Some(Modal::Settings(form));
                }
                KeyCode::Left | KeyCode::Right if form.field == SettingsField::Model => {
                    let count = self.config.ui.models.len().max(1);
                    form.model_index = if key.code == KeyCode::Right {
                        (form.model_index + 1) % count
                    } else {
                        (form.model_index + count - 1) % count
                    };
                    self.modal = Some(Modal::Settings(form));
                }
                KeyCode::Backspace if form.field == SettingsField::Title => {
                    form.title.pop();
                    self.modal = Some(Modal::Settings(form));
                }
                KeyCode::Char(c) if form.field == SettingsField::Title => {
                    form.title.push(c);
                    self.modal = Some(Modal::Settings(form));
                }
                _ => self.modal = Some(Modal::Settings(form)),
            },
            Modal::AttachImage(mut path) => match key.code {
                KeyCode::Esc => {}
                KeyCode::Enter => {
                    if !path.trim().is_empty() {
                        self.read_image(path);
                    }
                }
                KeyCode::Backspace => {
                    path.pop();
                    self.modal = Some(Modal::AttachImage(path));
                }
                KeyCode::Char(c) => {
                    path.push(c);
                    self.modal = Some(Modal::AttachImage(path));
                }
                _ => self.modal = Some(Modal::AttachImage(path)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MessageKind, Role};

    fn app() -> (App, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = InAppClient::new("http://127.0.0.1:9");
        (App::new(Config::default(), client, tx), rx)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn session(id: &str) -> Session {
        serde_json::from_str(&format!(
            r#"{{"id": "{}", "title": "Mock", "date": "2025-01-30T14:30:00"}}"#,
            id
        ))
        .unwrap()
    }

    #[test]
    fn ctrl_c_quits_and_q_closes() {
        let (mut app, _rx) = app();
        assert_eq!(
            app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Flow::Exit(WindowExit::QuitRequested)
        );
        assert_eq!(app.handle_key(key(KeyCode::Char('q'))), Flow::Exit(WindowExit::Closed));
    }

    #[tokio::test]
    async fn enter_on_blank_input_sends_nothing() {
        let (mut app, mut rx) = app();
        app.open_chat(session("s1"));
        // drain the thread/recall loads against the dead port
        for _ in 0..2 {
            rx.recv().await.unwrap();
        }

        app.handle_key(key(KeyCode::Enter));
        assert!(app.chat.as_ref().unwrap().messages().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_create_reports_one_error() {
        let (mut app, mut rx) = app();
        app.handle_key(key(KeyCode::Char('n')));
        app.handle_key(key(KeyCode::Char('n')));

        let event = rx.recv().await.unwrap();
        app.handle_event(event);
        assert_eq!(app.screen, Screen::Home);
        assert!(!app.starting_session);
        assert_eq!(app.notices.len(), 1);
        assert!(app.notices.current().unwrap().text.starts_with("Failed to start session"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn reply_for_another_session_does_not_touch_thread() {
        let (mut app, _rx) = app();
        app.open_chat(session("s1"));
        app.handle_event(UiEvent::MessageReplied {
            session_id: "other".into(),
            result: Err(anyhow::anyhow!("late")),
        });
        assert!(app.chat.as_ref().unwrap().messages().is_empty());
        assert_eq!(app.notices.len(), 1);
    }

    #[tokio::test]
    async fn history_navigation_and_load() {
        let (mut app, _rx) = app();
        app.modal = Some(Modal::History(HistoryView {
            sessions: vec![session("a"), session("b")],
            selected: 0,
            loading: false,
        }));

        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Down));
        match &app.modal {
            Some(Modal::History(view)) => assert_eq!(view.selected, 1),
            other => panic!("unexpected modal {:?}", other),
        }

        app.handle_key(key(KeyCode::Enter));
        assert!(app.modal.is_none());
        assert_eq!(app.screen, Screen::Chat);
        assert_eq!(app.chat.as_ref().unwrap().session_id(), "b");
        assert_eq!(app.notices.current().unwrap().text, "Session loaded successfully!");
    }

    fn message(id: &str, role: Role, content: &str) -> ChatMessage {
        ChatMessage {
            id: id.into(),
            session_id: "s1".into(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            message_type: MessageKind::Text,
            image_url: None,
            audio_url: None,
        }
    }

    fn type_and_send(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        app.handle_key(key(KeyCode::Enter));
    }

    #[tokio::test]
    async fn closing_before_thread_loads_keeps_stored_question_count() {
        let (mut app, _rx) = app();
        let mut earlier = session("s1");
        earlier.questions_asked = 8;
        app.open_chat(earlier);

        let (session_id, questions, _) = app.take_session_stats().unwrap();
        assert_eq!((session_id.as_str(), questions), ("s1", 8));
    }

    #[tokio::test]
    async fn failed_thread_load_keeps_stored_question_count() {
        let (mut app, _rx) = app();
        let mut earlier = session("s1");
        earlier.questions_asked = 3;
        app.open_chat(earlier);
        app.handle_event(UiEvent::ThreadLoaded {
            session_id: "s1".into(),
            result: Err(anyhow::anyhow!("Backend not reachable")),
        });

        assert_eq!(app.chat.as_ref().unwrap().questions_asked(), 3);
        assert_eq!(app.notices.len(), 1);
    }

    #[tokio::test]
    async fn reply_before_thread_loads_still_gets_the_thread() {
        let (mut app, _rx) = app();
        app.open_chat(session("s1"));
        type_and_send(&mut app, "why rust");
        app.handle_event(UiEvent::MessageReplied {
            session_id: "s1".into(),
            result: Ok(message("m-9", Role::Assistant, "memory safety")),
        });

        app.handle_event(UiEvent::ThreadLoaded {
            session_id: "s1".into(),
            result: Ok(vec![
                message("m-1", Role::User, "earlier question"),
                message("m-2", Role::Assistant, "earlier answer"),
                message("m-8", Role::User, "why rust"),
                message("m-9", Role::Assistant, "memory safety"),
            ]),
        });

        let chat = app.chat.as_ref().unwrap();
        let ids: Vec<&str> = chat.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m-1", "m-2", "m-8", "m-9"]);
        assert_eq!(chat.questions_asked(), 2);
    }

    #[tokio::test]
    async fn reloading_open_session_keeps_in_flight_send() {
        let (mut app, _rx) = app();
        app.open_chat(session("s1"));
        type_and_send(&mut app, "hello");
        assert!(app.chat.as_ref().unwrap().is_loading());

        app.modal = Some(Modal::History(HistoryView {
            sessions: vec![session("s1")],
            selected: 0,
            loading: false,
        }));
        app.handle_key(key(KeyCode::Enter));
        assert!(app.chat.as_ref().unwrap().is_loading());

        app.handle_event(UiEvent::MessageReplied {
            session_id: "s1".into(),
            result: Ok(message("m-2", Role::Assistant, "hi")),
        });
        let chat = app.chat.as_ref().unwrap();
        assert!(!chat.is_loading());
        assert_eq!(chat.messages().len(), 2);
    }

    #[tokio::test]
    async fn deleting_open_session_returns_home() {
        let (mut app, _rx) = app();
        app.open_chat(session("a"));
        app.handle_event(UiEvent::SessionDeleted {
            session_id: "a".into(),
            result: Ok(()),
        });
        assert!(app.chat.is_none());
        assert_eq!(app.screen, Screen::Home);
    }

    #[test]
    fn settings_cycle_models() {
        let (mut app, _rx) = app();
        app.config.ui.models = vec!["GPT-5.2".into(), "local".into()];
        app.open_settings();

        app.handle_key(key(KeyCode::Right));
        match &app.modal {
            Some(Modal::Settings(form)) => assert_eq!(form.model_index, 1),
            other => panic!("unexpected modal {:?}", other),
        }
        app.handle_key(key(KeyCode::Tab));
        app.handle_key(key(KeyCode::Char('!')));
        match &app.modal {
            Some(Modal::Settings(form)) => {
                assert_eq!(form.field, SettingsField::Title);
                assert_eq!(form.title, "New Interview Session!");
            }
            other => panic!("unexpected modal {:?}", other),
        }
        app.handle_key(key(KeyCode::Esc));
        assert!(app.modal.is_none());
        assert_eq!(app.config.ui.model, "GPT-5.2");
    }
}
