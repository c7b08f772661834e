pub mod tui_writer;

pub use tui_writer::{LogEntry, LogLevel, TuiWriter};
