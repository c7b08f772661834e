pub mod commands;
pub mod handlers;

pub use commands::{BackendCommands, Cli, Commands, ConfigCommands, LaunchArgs, SessionCommands};
