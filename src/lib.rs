// In desktop shell
// Supervises the local interview-assistant backend and hosts its UI

pub mod cli;
pub mod client;
pub mod core;
pub mod supervisor;
pub mod utils;

pub use client::InAppClient;
pub use core::{Config, ShellBridge};
pub use supervisor::{Shell, Supervisor};

pub use anyhow::{Error, Result};
