use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "in-desktop")]
#[command(about = "Desktop shell for the In interview assistant", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the backend if needed and open the assistant window (default)
    Launch(LaunchArgs),
    /// Backend process management
    Backend {
        #[command(subcommand)]
        command: BackendCommands,
    },
    /// Interview sessions stored by the backend
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Show recent inputs
    History {
        /// Only inputs from this session
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Print the values the shell hands to the web UI
    Bridge,
    /// Configuration file management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct LaunchArgs {
    /// Open the web UI in a browser instead of the terminal UI
    #[arg(long)]
    pub web: bool,
    /// Development mode: run the backend from source and prefer the dev server
    #[arg(long)]
    pub dev: bool,
    /// Never spawn the backend, only connect to a running one
    #[arg(long)]
    pub no_spawn: bool,
    /// Write logs to this file instead of the window's log panel
    #[arg(long)]
    pub logfile: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum BackendCommands {
    /// Run the backend in the foreground until Ctrl+C
    Start {
        /// Development mode: python -m uvicorn from the backend directory
        #[arg(long)]
        dev: bool,
    },
    /// Check whether the backend answers
    Status,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommands {
    /// List all sessions, newest first
    List,
    /// Show a session and its messages
    Show {
        session_id: String,
    },
    /// Create a session
    New {
        /// Session title (defaults to the configured title)
        #[arg(short, long)]
        title: Option<String>,
        /// Model name (defaults to the configured model)
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Delete a session
    Delete {
        session_id: String,
    },
    /// Delete every message of a session, keeping the session
    Clear {
        session_id: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Print the configuration file location
    Path,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}
