pub mod app;
pub mod attachment;
pub mod chat;
pub mod http;
pub mod tui;

pub use app::App;
pub use attachment::ImageAttachment;
pub use chat::{ChatState, Notices};
pub use http::InAppClient;
pub use tui::{ChatTui, TerminalWindow};
