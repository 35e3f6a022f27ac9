//! Command handlers for the Nodelink CLI

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use nodelink_core::{AppEvent, CommandEnvelope, PeripheralId, SessionState, SystemTimeSource};

use crate::app::NodeApp;
use crate::cli::{Commands, ExecAction};
use crate::error::Result;
use crate::shell;
use crate::state::describe_entry;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command, then stop the app
    pub async fn execute(command: Commands, mut app: NodeApp) -> Result<()> {
        let outcome = match command {
            Commands::Scan { seconds, json } => Self::handle_scan_command(&mut app, seconds, json).await,
            Commands::Shell => shell::run(&mut app).await,
            Commands::Exec { device, action } => {
                Self::handle_exec_command(&mut app, PeripheralId::new(device), action).await
            }
        };

        // Always release the device, but report the command's own failure first
        let stopped = app.stop().await;
        outcome?;
        stopped
    }

    /// Scan for the configured time (or the session's scan timeout) and list devices
    async fn handle_scan_command(app: &mut NodeApp, seconds: Option<u64>, json: bool) -> Result<()> {
        let limit = seconds
            .map(Duration::from_secs)
            .unwrap_or(app.config.session.scan_timeout);
        info!("Scanning for node devices for {:?}", limit);

        app.runtime().start_scan().await?;
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            match tokio::time::timeout_at(deadline, app.next_event()).await {
                Err(_) => break,
                Ok(event) => {
                    let (event, line) = event?;
                    if !json {
                        if let (AppEvent::DeviceDiscovered { .. }, Some(line)) = (&event, line) {
                            println!("{}", line);
                        }
                    }
                    // The session's own scan timeout ends the scan early
                    if let AppEvent::Log(entry) = &event {
                        if entry.message == "Scan timed out" {
                            break;
                        }
                    }
                }
            }
        }
        if app.state.session_state == SessionState::Scanning {
            app.runtime().stop_scan().await?;
        }

        if json {
            println!("{}", serde_json::to_string_pretty(app.state.directory.entries())?);
        } else if app.state.directory.is_empty() {
            println!("No node devices found");
        } else {
            println!("{} device(s):", app.state.directory.len());
            for entry in app.state.directory.iter() {
                println!("  {}", describe_entry(entry));
            }
        }
        Ok(())
    }

    /// Connect, run one action and print the result
    async fn handle_exec_command(app: &mut NodeApp, device: PeripheralId, action: ExecAction) -> Result<()> {
        app.connect_ready(&device).await?;
        println!("Connected to {}", device);

        let response_timeout = app.config.cli.response_timeout();
        match action {
            ExecAction::Sync => {
                let envelope = CommandEnvelope::set_timestamp_now(&SystemTimeSource);
                Self::send_and_confirm(app, envelope).await?;
            }
            ExecAction::Clear => Self::send_and_confirm(app, CommandEnvelope::ClearMemory).await?,
            ExecAction::Mode { mode } => {
                Self::send_and_confirm(app, CommandEnvelope::SetOperatingMode { mode }).await?
            }
            ExecAction::List => {
                app.send(CommandEnvelope::RequestFilenameList).await?;
                app.send(CommandEnvelope::RequestFilenameNotify).await?;
                let listing = app
                    .wait_for("filename listing", response_timeout, |event| {
                        matches!(event, AppEvent::FilenamesReceived { .. })
                    })
                    .await?;
                if let AppEvent::FilenamesReceived { filenames, .. } = listing {
                    for filename in filenames {
                        println!("{}", filename);
                    }
                }
            }
            ExecAction::Get { name, output, idle_ms } => {
                let idle = idle_ms
                    .map(Duration::from_millis)
                    .unwrap_or_else(|| app.config.cli.transfer_idle());
                let file = app.download(&name, idle).await?;
                if file.bytes.is_empty() {
                    warn!("Transfer of {} produced no data", name);
                }
                Self::write_output(&file.bytes, &file.hex, output)?;
            }
        }
        Ok(())
    }

    /// Send a command and wait for the session to log it as sent
    async fn send_and_confirm(app: &mut NodeApp, envelope: CommandEnvelope) -> Result<()> {
        let name = envelope.name();
        app.send(envelope).await?;
        let limit = app.config.cli.response_timeout();
        let prefix = format!("Sent {} ", name);
        let sent = app
            .wait_for(name, limit, |event| {
                matches!(event, AppEvent::Log(entry) if entry.message.starts_with(&prefix))
            })
            .await?;
        if let AppEvent::Log(entry) = sent {
            println!("{}", entry.message);
        }
        Ok(())
    }

    fn write_output(bytes: &[u8], hex: &str, output: Option<PathBuf>) -> Result<()> {
        match output {
            Some(path) => {
                std::fs::write(&path, bytes)?;
                println!("Wrote {} bytes to {}", bytes.len(), path.display());
            }
            None => println!("{}", hex),
        }
        Ok(())
    }
}
