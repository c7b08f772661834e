use anyhow::{bail, Context};
use tokio::sync::mpsc;

use crate::cli::{BackendCommands, ConfigCommands, LaunchArgs, SessionCommands};
use crate::client::{InAppClient, TerminalWindow};
use crate::core::config::{config_file_path, LaunchMode, WindowKind};
use crate::core::{Role, ShellBridge};
use crate::supervisor::{
    BackendOutput, BackendStatus, BrowserWindow, LaunchCommand, Readiness, ReadinessOptions, Shell,
    StdinActivation, Supervisor, SystemBrowser, TokioSpawner,
};
use crate::utils::tui_writer::LogEntry;
use crate::{Config, Result};

/// Fold `launch` flags into the loaded configuration
pub fn apply_launch_args(config: &mut Config, args: &LaunchArgs) {
    if args.dev {
        config.launch.mode = LaunchMode::Development;
    }
    if args.no_spawn {
        config.launch.spawn = false;
    }
    if args.web {
        config.window.kind = WindowKind::Browser;
    }
}

pub fn build_supervisor(
    config: &Config,
    command: LaunchCommand,
) -> Supervisor<InAppClient, TokioSpawner> {
    Supervisor::new(InAppClient::from_config(config), TokioSpawner, command)
    .with_readiness(ReadinessOptions {
        timeout: config.ready_timeout(),
        interval: config.poll_interval(),
    })
    .with_spawn_enabled(config.launch.spawn)
}

/// `backend start` runs in the foreground, so the child may write to this terminal
fn foreground_command(config: &Config) -> LaunchCommand {
    let command = LaunchCommand::from_config(config);
    match command.output {
        BackendOutput::Trace => command.with_output(BackendOutput::Inherit),
        _ => command,
    }
}

pub async fn launch(config: Config, log_rx: Option<mpsc::UnboundedReceiver<LogEntry>>) -> Result<()> {
    tracing::info!(
        "Launching ({} mode, {:?} window)",
        if config.is_dev() { "development" } else { "production" },
        config.window.kind
    );

    let mut shell = Shell::new(
        build_supervisor(&config, LaunchCommand::from_config(&config)),
        config.window.stay_resident,
    );
    let mut activation = StdinActivation;

    match config.window.kind {
        WindowKind::Terminal => {
            let log_rx = log_rx.unwrap_or_else(|| mpsc::unbounded_channel().1);
            let mut window = TerminalWindow::new(config, log_rx);
            shell.run(&mut window, &mut activation).await
        }
        WindowKind::Browser => {
            let mut window = BrowserWindow::new(&config, SystemBrowser)?;
            shell.run(&mut window, &mut activation).await
        }
    }
}

pub async fn handle_backend_command(mut config: Config, command: BackendCommands) -> Result<()> {
    match command {
        BackendCommands::Start { dev } => {
            if dev {
                config.launch.mode = LaunchMode::Development;
            }
            let mut supervisor = build_supervisor(&config, foreground_command(&config));

            match supervisor.ensure_backend().await? {
                BackendStatus::AlreadyRunning => {
                    println!("✅ Backend is already running at {}", config.backend_url());
                    return Ok(());
                }
                BackendStatus::NotRunning => {
                    println!("❌ Backend is not running and spawning is disabled in the config");
                    return Ok(());
                }
                BackendStatus::Spawned { pid } => {
                    println!("🚀 Started backend (PID {})", pid.unwrap_or(0));
                    println!("   {}", supervisor.command());
                }
            }

            match supervisor.wait_until_ready().await {
                Readiness::Ready { waited } => println!(
                    "✅ Backend ready at {} after {:.1}s",
                    config.backend_url(),
                    waited.as_secs_f64()
                ),
                Readiness::Exited(exit) => bail!("Backend exited during startup ({})", exit),
                Readiness::TimedOut { waited } => println!(
                    "⚠️  Backend did not answer within {}s, still waiting for it",
                    waited.as_secs()
                ),
            }

            println!("💡 Press Ctrl+C to stop the backend");
            tokio::signal::ctrl_c().await?;
            eprintln!("\nShutting down...");
            supervisor.shutdown();
        }
        BackendCommands::Status => {
            let client = InAppClient::from_config(&config);
            match client.probe().await {
                Ok(()) => println!("✅ Backend is running at {}", client.base_url()),
                Err(e) => {
                    println!("❌ Backend is not running at {}", client.base_url());
                    println!("   {}", e);
                    println!("💡 Start it with: in-desktop backend start");
                }
            }
        }
    }
    Ok(())
}

/// Fail early with a readable message instead of a connection error
async fn connect(config: &Config) -> Result<InAppClient> {
    let client = InAppClient::from_config(config);
    if !client.is_backend_running().await {
        bail!(
            "Backend is not running at {}. Start it with: in-desktop backend start",
            client.base_url()
        );
    }
    Ok(client)
}

pub async fn handle_session_command(config: Config, command: SessionCommands) -> Result<()> {
    let client = connect(&config).await?;

    match command {
        SessionCommands::List => {
            let sessions = client.list_sessions().await?;
            if sessions.is_empty() {
                println!("No sessions yet");
                println!("💡 Create one with: in-desktop sessions new");
                return Ok(());
            }
            println!("📋 Sessions ({}):", sessions.len());
            for session in sessions {
                println!(
                    "   {}  {:<28} {}  {:>8}  {:>3} questions  {}",
                    session.id,
                    session.title,
                    session.date.format("%Y-%m-%d %H:%M"),
                    session.duration,
                    session.questions_asked,
                    session.model
                );
            }
        }
        SessionCommands::Show { session_id } => {
            let session = client.get_session(&session_id).await?;
            let messages = client.get_messages(&session_id).await?;

            println!("📋 {} ({})", session.title, session.id);
            println!(
                "   {} | {} | {} | {} questions",
                session.model,
                session.date.format("%Y-%m-%d %H:%M"),
                session.duration,
                session.questions_asked
            );
            for message in messages {
                let who = match message.role {
                    Role::User => "You",
                    Role::Assistant => "Assistant",
                };
                println!("\n[{}] {}:", message.timestamp.format("%H:%M"), who);
                if message.image_url.is_some() {
                    println!("  [image attached]");
                }
                for line in message.content.lines() {
                    println!("  {}", line);
                }
            }
        }
        SessionCommands::New { title, model } => {
            let title = title.unwrap_or_else(|| config.ui.session_title.clone());
            let model = model.unwrap_or_else(|| config.ui.model.clone());
            let session = client.create_session(&title, &model).await?;
            println!("✅ Created session '{}' ({})", session.title, session.id);
        }
        SessionCommands::Delete { session_id } => {
            client.delete_session(&session_id).await?;
            println!("✅ Deleted session {}", session_id);
        }
        SessionCommands::Clear { session_id } => {
            let deleted = client.delete_messages(&session_id).await?;
            println!("✅ Deleted {} messages from session {}", deleted, session_id);
        }
    }
    Ok(())
}

pub async fn show_history(config: Config, session_id: Option<String>) -> Result<()> {
    let client = connect(&config).await?;

    let inputs: Vec<String> = match &session_id {
        Some(id) => client
            .session_input_history(id)
            .await?
            .into_iter()
            .map(|entry| entry.input)
            .collect(),
        None => client.list_input_history().await?,
    };

    if inputs.is_empty() {
        println!("No inputs recorded");
        return Ok(());
    }
    for input in inputs {
        println!("  • {}", input);
    }
    Ok(())
}

pub fn show_bridge(config: &Config) -> Result<()> {
    let bridge = ShellBridge::from_config(config);
    println!("{}", serde_json::to_string_pretty(&bridge)?);
    Ok(())
}

pub fn handle_config_command(config: &Config, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            print!("{}", toml::to_string_pretty(config)?);
        }
        ConfigCommands::Path => match config_file_path() {
            Some(path) => println!("{}", path.display()),
            None => bail!("No configuration directory on this platform"),
        },
        ConfigCommands::Init { force } => {
            let path = config_file_path().context("No configuration directory on this platform")?;
            if path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default().save_to(&path)?;
            println!("✅ Wrote {}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_flags_override_config() {
        let mut config = Config::default();
        apply_launch_args(
            &mut config,
            &LaunchArgs {
                web: true,
                dev: true,
                no_spawn: true,
                logfile: None,
            },
        );
        assert_eq!(config.window.kind, WindowKind::Browser);
        assert_eq!(config.launch.mode, LaunchMode::Development);
        assert!(!config.launch.spawn);
        assert!(config.is_dev());
    }

    #[test]
    fn no_flags_keep_config() {
        let mut config = Config::default();
        let kind = config.window.kind;
        apply_launch_args(&mut config, &LaunchArgs::default());
        assert_eq!(config.window.kind, kind);
        assert!(config.launch.spawn);
    }

    #[test]
    fn backend_start_keeps_child_output_on_the_terminal() {
        let mut config = Config::default();
        config.window.kind = WindowKind::Terminal;
        assert_eq!(foreground_command(&config).output, BackendOutput::Inherit);

        config.launch.log_file = Some("backend.log".into());
        assert_eq!(
            foreground_command(&config).output,
            BackendOutput::File("backend.log".into())
        );
    }
}
