pub mod bridge;
pub mod config;
pub mod session;

pub use bridge::ShellBridge;
pub use config::Config;
pub use session::{
    ChatMessage, InputHistoryEntry, MessageKind, NewInputHistory, NewSession, Role, SendMessage,
    Session,
};
