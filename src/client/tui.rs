use anyhow::Result;
use chrono::{Local, Utc};
use crossterm::{
    event::{Event, EventStream},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::collections::VecDeque;
use std::io;
use tokio::sync::mpsc;
use tokio::time::Duration;

use super::app::{App, Flow, HistoryView, Modal, Screen, SettingsField, SettingsForm, UiEvent};
use super::chat::{ChatState, NoticeLevel, Notices};
use super::http::InAppClient;
use crate::core::{Config, MessageKind, Role};
use crate::supervisor::{ShellWindow, StartupReport, WindowExit};
use crate::utils::tui_writer::{LogEntry, LogLevel};

const LOG_PANEL_HEIGHT: u16 = 6;
const TICK: Duration = Duration::from_millis(250);

pub struct ChatTui {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl ChatTui {
    pub fn new() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(ChatTui { terminal })
    }

    pub async fn run(
        &mut self,
        app: &mut App,
        ui_rx: &mut mpsc::UnboundedReceiver<UiEvent>,
        log_rx: &mut mpsc::UnboundedReceiver<LogEntry>,
    ) -> Result<WindowExit> {
        let mut event_stream = EventStream::new();
        let mut tick = tokio::time::interval(TICK);

        loop {
            self.draw(app)?;

            tokio::select! {
                biased;
                maybe_event = event_stream.next() => {
                    match maybe_event {
                        Some(Ok(Event::Key(key))) => {
                            if let Flow::Exit(exit) = app.handle_key(key) {
                                tracing::info!("Window closing ({:?})", exit);
                                return Ok(exit);
                            }
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(WindowExit::QuitRequested),
                    }
                }
                Some(event) = ui_rx.recv() => app.handle_event(event),
                Some(entry) = log_rx.recv() => app.push_log(entry),
                _ = tick.tick() => {}
            }
        }
    }

    fn draw(&mut self, app: &App) -> Result<()> {
        self.terminal.draw(|f| render(f, app))?;
        Ok(())
    }

    fn cleanup(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

impl Drop for ChatTui {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// The assistant UI drawn in the current terminal
pub struct TerminalWindow {
    config: Config,
    log_rx: mpsc::UnboundedReceiver<LogEntry>,
}

impl TerminalWindow {
    pub fn new(config: Config, log_rx: mpsc::UnboundedReceiver<LogEntry>) -> Self {
        Self { config, log_rx }
    }
}

impl ShellWindow for TerminalWindow {
    async fn run(&mut self, report: &StartupReport) -> Result<WindowExit> {
        let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
        let client = InAppClient::from_config(&self.config);
        let mut app = App::new(self.config.clone(), client, ui_tx);
        if let Some(warning) = report.warning() {
            app.notices.error(warning);
        }

        let result = {
            let mut tui = ChatTui::new()?;
            tui.run(&mut app, &mut ui_rx, &mut self.log_rx).await
        };

        app.flush_session_stats().await;
        self.config = app.config;
        result
    }
}

fn render(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(1),
            Constraint::Length(LOG_PANEL_HEIGHT),
        ])
        .split(f.area());

    draw_header(f, chunks[0], app);
    match (&app.screen, &app.chat) {
        (Screen::Chat, Some(chat)) => draw_chat(f, chunks[1], chat),
        _ => draw_home(f, chunks[1], app),
    }
    draw_notice_bar(f, chunks[2], &app.notices, app.screen);
    draw_system_logs(f, chunks[3], &app.logs);

    match &app.modal {
        Some(Modal::History(view)) => draw_history(f, f.area(), view),
        Some(Modal::Settings(form)) => draw_settings(f, f.area(), form, &app.config.ui.models),
        Some(Modal::AttachImage(path)) => draw_attach_prompt(f, f.area(), path),
        None => {}
    }
}

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
    let title = match &app.chat {
        Some(chat) if app.screen == Screen::Chat => format!(
            " {} | {} | {} | {} questions ",
            chat.session.title,
            chat.model,
            chat.elapsed_display(Utc::now()),
            chat.questions_asked()
        ),
        _ => format!(" {} ", app.config.window.title),
    };

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            title,
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("backend {}", app.backend_url()),
            Style::default().fg(Color::DarkGray),
        ),
    ]))
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)),
    );
    f.render_widget(header, area);
}

fn draw_home(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .title(" Welcome ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let key = |k: &'static str| {
        Span::styled(
            k,
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    };

    let starting = if app.starting_session {
        "Starting session..."
    } else {
        ""
    };

    let lines = vec![
        Line::from(""),
        Line::from("Your AI interview assistant. Ask a question, attach a screenshot,"),
        Line::from("and get an answer while the interview is running."),
        Line::from(""),
        Line::from(vec![key("n / Enter"), Span::raw("  start a new session")]),
        Line::from(vec![key("h"), Span::raw("          browse session history")]),
        Line::from(vec![key("s"), Span::raw("          settings")]),
        Line::from(vec![key("q"), Span::raw("          close the window")]),
        Line::from(vec![key("Ctrl+C"), Span::raw("     quit")]),
        Line::from(""),
        Line::from(Span::styled(starting, Style::default().fg(Color::Magenta))),
    ];

    let paragraph = Paragraph::new(lines)
        .block(block)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, area);
}

fn draw_chat(f: &mut Frame, area: Rect, chat: &ChatState) {
    let preview_height = if chat.image().is_some() { 1 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(preview_height),
            Constraint::Length(3),
        ])
        .split(area);

    draw_thread(f, chunks[0], chat);

    if let Some(image) = chat.image() {
        let preview = Paragraph::new(format!(" [image] {}  (Ctrl+X to remove)", image.preview()))
            .style(Style::default().fg(Color::Magenta));
        f.render_widget(preview, chunks[1]);
    }

    let input_block = Block::default()
        .title(" Message ")
        .borders(Borders::ALL)
        .border_style(if chat.is_loading() {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default().fg(Color::Yellow)
        });
    let input = Paragraph::new(chat.input.as_str()).block(input_block);
    f.render_widget(input, chunks[2]);

    let inner_width = chunks[2].width.saturating_sub(2);
    let cursor_x = chunks[2].x + 1 + (chat.input.chars().count() as u16).min(inner_width);
    f.set_cursor_position((cursor_x, chunks[2].y + 1));
}

fn draw_thread(f: &mut Frame, area: Rect, chat: &ChatState) {
    let block = Block::default()
        .title(" Conversation ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let mut lines: Vec<Line> = Vec::new();
    for message in chat.messages() {
        let (label, color, align) = match message.role {
            Role::User => ("You", Color::Yellow, Alignment::Right),
            Role::Assistant => ("Assistant", Color::Cyan, Alignment::Left),
        };
        let time = message.timestamp.with_timezone(&Local).format("%H:%M");
        lines.push(
            Line::from(vec![
                Span::styled(
                    label,
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ),
                Span::styled(format!("  {}", time), Style::default().fg(Color::DarkGray)),
            ])
            .alignment(align),
        );
        if message.image_url.is_some() || message.message_type == MessageKind::Image {
            lines.push(
                Line::from(Span::styled(
                    "[image attached]",
                    Style::default().fg(Color::Magenta),
                ))
                .alignment(align),
            );
        }
        for text in message.content.lines() {
            lines.push(Line::from(text.to_string()).alignment(align));
        }
        lines.push(Line::from(""));
    }

    if chat.is_loading() {
        lines.push(Line::from(Span::styled(
            "Assistant is thinking...",
            Style::default()
                .fg(Color::Gray)
                .add_modifier(Modifier::ITALIC),
        )));
    } else if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            "No messages yet. Type a question and press Enter.",
            Style::default().fg(Color::Gray),
        )));
    }

    let inner = block.inner(area);
    let scroll = wrapped_height(&lines, inner.width).saturating_sub(inner.height);
    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    f.render_widget(paragraph, area);
}

/// Rows the lines occupy once wrapped to `width`
fn wrapped_height(lines: &[Line], width: u16) -> u16 {
    let width = width.max(1) as usize;
    lines
        .iter()
        .map(|line| line.width().max(1).div_ceil(width))
        .sum::<usize>()
        .min(u16::MAX as usize) as u16
}

fn draw_notice_bar(f: &mut Frame, area: Rect, notices: &Notices, screen: Screen) {
    let bar = match notices.current() {
        Some(notice) => {
            let style = match notice.level {
                NoticeLevel::Success => Style::default().bg(Color::Green).fg(Color::Black),
                NoticeLevel::Info => Style::default().bg(Color::Blue).fg(Color::White),
                NoticeLevel::Error => Style::default().bg(Color::Red).fg(Color::White),
            };
            Paragraph::new(notice.text.as_str()).style(style.add_modifier(Modifier::BOLD))
        }
        None => {
            let hints = match screen {
                Screen::Home => "n: New | h: History | s: Settings | q: Close | Ctrl+C: Quit",
                Screen::Chat => {
                    "Enter: Send | Up/Down: Recall | Ctrl+A: Image | Ctrl+O: History | Ctrl+P: Settings | Esc: End"
                }
            };
            Paragraph::new(hints).style(Style::default().fg(Color::Gray))
        }
    };
    f.render_widget(bar.alignment(Alignment::Center), area);
}

fn draw_system_logs(f: &mut Frame, area: Rect, logs: &VecDeque<LogEntry>) {
    let logs_block = Block::default()
        .title(" Logs ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    if logs.is_empty() {
        let no_logs = Paragraph::new("No logs")
            .style(Style::default().fg(Color::Gray))
            .block(logs_block)
            .alignment(Alignment::Center);
        f.render_widget(no_logs, area);
        return;
    }

    let visible = area.height.saturating_sub(2) as usize;
    let log_lines: Vec<Line> = logs
        .iter()
        .skip(logs.len().saturating_sub(visible))
        .map(|log| {
            let level_color = match log.level {
                LogLevel::Error => Color::Red,
                LogLevel::Warn => Color::Yellow,
                LogLevel::Info => Color::Cyan,
                LogLevel::Debug => Color::Gray,
                LogLevel::Trace => Color::DarkGray,
            };
            Line::from(vec![
                Span::styled(
                    format!("[{}] ", log.timestamp.with_timezone(&Local).format("%H:%M:%S")),
                    Style::default().fg(Color::Gray),
                ),
                Span::styled(
                    format!("{:<5} ", log.level.as_str()),
                    Style::default()
                        .fg(level_color)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw(log.message.clone()),
            ])
        })
        .collect();

    f.render_widget(Paragraph::new(log_lines).block(logs_block), area);
}

/// A centered rectangle of at most `width` x `height`
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + area.width.saturating_sub(width) / 2,
        area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    )
}

fn draw_history(f: &mut Frame, area: Rect, view: &HistoryView) {
    let popup = centered(area, 80, 20);
    f.render_widget(Clear, popup);

    let block = Block::default()
        .title(" History  (Enter: open | d: delete | r: refresh | Esc: close) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .style(Style::default().bg(Color::Black));

    if view.loading || view.sessions.is_empty() {
        let text = if view.loading {
            "Loading sessions..."
        } else {
            "No sessions yet"
        };
        let empty = Paragraph::new(text)
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center)
            .block(block);
        f.render_widget(empty, popup);
        return;
    }

    let items: Vec<ListItem> = view
        .sessions
        .iter()
        .map(|session| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<28}", truncate(&session.title, 28)),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!(
                        " {}  ",
                        session.date.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                    ),
                    Style::default().fg(Color::Gray),
                ),
                Span::raw(format!(
                    "{:<8} {:>3} questions  {}",
                    session.duration, session.questions_asked, session.model
                )),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");
    let mut state = ListState::default();
    state.select(Some(view.selected));
    f.render_stateful_widget(list, popup, &mut state);
}

fn draw_settings(f: &mut Frame, area: Rect, form: &SettingsForm, models: &[String]) {
    let popup = centered(area, 60, 8);
    f.render_widget(Clear, popup);

    let block = Block::default()
        .title(" Settings  (Enter: save | Esc: cancel) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .style(Style::default().bg(Color::Black));

    let selected = |field: SettingsField| {
        if form.field == field {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        }
    };
    let model = models
        .get(form.model_index)
        .map(String::as_str)
        .unwrap_or("-");

    let lines = vec![
        Line::from(""),
        Line::from(vec![
            Span::styled("Model:         ", selected(SettingsField::Model)),
            Span::raw(format!("< {} >", model)),
        ]),
        Line::from(vec![
            Span::styled("Session title: ", selected(SettingsField::Title)),
            Span::raw(form.title.as_str()),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            "Tab: switch field | Left/Right: change model",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    f.render_widget(Paragraph::new(lines).block(block), popup);
}

fn draw_attach_prompt(f: &mut Frame, area: Rect, path: &str) {
    let popup = centered(area, 70, 5);
    f.render_widget(Clear, popup);

    let block = Block::default()
        .title(" Attach image  (Enter: attach | Esc: cancel) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta))
        .style(Style::default().bg(Color::Black));
    let lines = vec![
        Line::from(Span::styled("Path to an image file:", Style::default().fg(Color::Gray))),
        Line::from(path),
    ];
    f.render_widget(Paragraph::new(lines).block(block), popup);
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut short: String = text.chars().take(max.saturating_sub(3)).collect();
        short.push_str("...");
        short
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_height_counts_wrapped_rows() {
        let lines = vec![Line::from("abcdefghij"), Line::from(""), Line::from("abc")];
        assert_eq!(wrapped_height(&lines, 4), 3 + 1 + 1);
        assert_eq!(wrapped_height(&lines, 0), 10 + 1 + 3);
    }

    #[test]
    fn centered_stays_inside_area() {
        let area = Rect::new(0, 0, 40, 10);
        let popup = centered(area, 80, 20);
        assert_eq!(popup, area);

        let popup = centered(area, 20, 4);
        assert_eq!(popup, Rect::new(10, 3, 20, 4));
    }

    #[test]
    fn long_titles_are_truncated() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long session title", 10), "a very ...");
    }
}
