use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use in_desktop::cli::handlers;
use in_desktop::cli::{Cli, Commands, LaunchArgs};
use in_desktop::core::config::WindowKind;
use in_desktop::utils::tui_writer::{LogEntry, TuiWriter};
use in_desktop::{Config, Result};

fn env_filter() -> Result<EnvFilter> {
    Ok(EnvFilter::from_default_env().add_directive("in_desktop=info".parse()?))
}

/// Route logs away from the screen while the terminal UI owns it
fn init_launch_tracing(
    config: &Config,
    args: &LaunchArgs,
) -> Result<Option<mpsc::UnboundedReceiver<LogEntry>>> {
    if let Some(path) = &args.logfile {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        tracing_subscriber::fmt()
            .with_env_filter(env_filter()?)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
        return Ok(None);
    }

    if config.window.kind == WindowKind::Terminal {
        let (writer, log_rx) = TuiWriter::new();
        tracing_subscriber::fmt()
            .with_env_filter(env_filter()?)
            .with_ansi(false)
            .with_writer(writer)
            .init();
        return Ok(Some(log_rx));
    }

    tracing_subscriber::fmt().with_env_filter(env_filter()?).init();
    Ok(None)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load()?;
    let command = cli
        .command
        .unwrap_or_else(|| Commands::Launch(LaunchArgs::default()));

    let log_rx = match &command {
        Commands::Launch(args) => {
            handlers::apply_launch_args(&mut config, args);
            init_launch_tracing(&config, args)?
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter()?)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    };

    match command {
        Commands::Launch(_) => handlers::launch(config, log_rx).await,
        Commands::Backend { command } => handlers::handle_backend_command(config, command).await,
        Commands::Sessions { command } => handlers::handle_session_command(config, command).await,
        Commands::History { session } => handlers::show_history(config, session).await,
        Commands::Bridge => handlers::show_bridge(&config),
        Commands::Config { command } => handlers::handle_config_command(&config, command),
    }
}
