use std::io;
use std::str::FromStr;
use tokio::sync::mpsc;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ERROR" => Ok(LogLevel::Error),
            "WARN" => Ok(LogLevel::Warn),
            "INFO" => Ok(LogLevel::Info),
            "DEBUG" => Ok(LogLevel::Debug),
            "TRACE" => Ok(LogLevel::Trace),
            _ => Err(()),
        }
    }
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub target: Option<String>,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl LogEntry {
    fn plain(message: &str) -> Self {
        LogEntry {
            level: LogLevel::Info,
            target: None,
            message: message.to_string(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Captures formatted tracing output so the terminal UI can show it in its
/// log strip instead of writing over the alternate screen
#[derive(Clone)]
pub struct TuiWriter {
    sender: mpsc::UnboundedSender<LogEntry>,
}

impl TuiWriter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LogEntry>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (TuiWriter { sender }, receiver)
    }
}

impl io::Write for TuiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        for entry in text.lines().filter_map(parse_tracing_line) {
            // receiver gone means no window is listening; drop the line
            let _ = self.sender.send(entry);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for TuiWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Parses "2026-01-30T14:30:00.123Z  INFO in_desktop::supervisor: message"
fn parse_tracing_line(line: &str) -> Option<LogEntry> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let mut parts = line.split_whitespace();
    let (Some(timestamp), Some(level)) = (parts.next(), parts.next()) else {
        return Some(LogEntry::plain(line));
    };

    let (Ok(timestamp), Ok(level)) = (
        chrono::DateTime::parse_from_rfc3339(timestamp),
        level.parse::<LogLevel>(),
    ) else {
        return Some(LogEntry::plain(line));
    };

    // skip the timestamp and level tokens
    let rest = line
        .split_once(char::is_whitespace)
        .and_then(|(_, rest)| rest.trim_start().split_once(char::is_whitespace))
        .map(|(_, rest)| rest.trim_start())
        .unwrap_or_default();

    let (target, message) = match rest.split_once(": ") {
        Some((target, message)) if !target.contains(' ') => {
            (Some(target.to_string()), message.to_string())
        }
        _ => (None, rest.to_string()),
    };

    Some(LogEntry {
        level,
        target,
        message,
        timestamp: timestamp.with_timezone(&chrono::Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_formatted_tracing_line() {
        let line = "2026-01-30T14:30:07.498408Z  WARN in_desktop::supervisor: Backend exited: exit code 1";
        let parsed = parse_tracing_line(line).unwrap();

        assert_eq!(parsed.level, LogLevel::Warn);
        assert_eq!(parsed.target.as_deref(), Some("in_desktop::supervisor"));
        assert_eq!(parsed.message, "Backend exited: exit code 1");
    }

    #[test]
    fn plain_text_becomes_info() {
        let parsed = parse_tracing_line("uvicorn printed something").unwrap();
        assert_eq!(parsed.level, LogLevel::Info);
        assert!(parsed.target.is_none());
        assert_eq!(parsed.message, "uvicorn printed something");
        assert!(parse_tracing_line("   ").is_none());
    }

    #[test]
    fn writer_splits_lines_into_entries() {
        let (mut writer, mut rx) = TuiWriter::new();
        writer
            .write_all(b"2026-01-30T14:30:07Z ERROR in_desktop: one\n2026-01-30T14:30:08Z  INFO in_desktop: two\n")
            .unwrap();

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!((first.level, first.message.as_str()), (LogLevel::Error, "one"));
        assert_eq!((second.level, second.message.as_str()), (LogLevel::Info, "two"));
        assert!(rx.try_recv().is_err());
    }
}
