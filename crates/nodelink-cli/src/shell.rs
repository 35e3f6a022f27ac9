//! Interactive line-oriented shell
//!
//! Reads one command per line from stdin while printing session events as they
//! arrive. Commands are fire-and-forget: their outcome shows up as events.

use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use nodelink_core::{CommandEnvelope, SystemTimeSource};

use crate::app::NodeApp;
use crate::error::{CliError, Result};

pub const HELP: &str = "\
Commands:
  scan                 Scan for node devices
  stop                 Stop scanning
  devices              List discovered devices
  connect <n|id>       Connect to a listed device or a peripheral id
  disconnect           Disconnect from the device
  sync                 Set the node clock to the host time
  list                 Request the filename listing
  notify               Request a filename notification
  get <name>           Request a file transfer
  mode <n>             Set the operating mode
  clear                Erase node memory
  finish               Finish the current transfer
  save <path>          Write the last finished file to disk
  status               Show session status
  log                  Show the event log
  help                 Show this help
  quit                 Exit";

/// One parsed shell line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Scan,
    Stop,
    Devices,
    Connect(String),
    Disconnect,
    Sync,
    List,
    Notify,
    Get(String),
    Mode(i64),
    Clear,
    Finish,
    Save(PathBuf),
    Status,
    Log,
    Help,
    Quit,
}

impl ShellCommand {
    /// Parse a line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        let Some((word, rest)) = split_word(line) else {
            return Ok(None);
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "scan" => ShellCommand::Scan,
            "stop" => ShellCommand::Stop,
            "devices" | "ls" => ShellCommand::Devices,
            "connect" => ShellCommand::Connect(required(rest, "connect <n|id>")?),
            "disconnect" => ShellCommand::Disconnect,
            "sync" => ShellCommand::Sync,
            "list" => ShellCommand::List,
            "notify" => ShellCommand::Notify,
            // Filenames may contain spaces
            "get" => ShellCommand::Get(required(rest, "get <name>")?),
            "mode" => {
                let value = required(rest, "mode <n>")?;
                let mode = value
                    .parse()
                    .map_err(|_| CliError::InvalidArgument(format!("Not a mode number: {}", value)))?;
                ShellCommand::Mode(mode)
            }
            "clear" => ShellCommand::Clear,
            "finish" => ShellCommand::Finish,
            "save" => ShellCommand::Save(PathBuf::from(required(rest, "save <path>")?)),
            "status" => ShellCommand::Status,
            "log" => ShellCommand::Log,
            "help" | "?" => ShellCommand::Help,
            "quit" | "exit" => ShellCommand::Quit,
            other => {
                return Err(CliError::InvalidArgument(format!(
                    "Unknown command: {} (try 'help')",
                    other
                )))
            }
        };
        Ok(Some(command))
    }
}

fn split_word(line: &str) -> Option<(&str, &str)> {
    if line.is_empty() {
        return None;
    }
    match line.split_once(char::is_whitespace) {
        Some((word, rest)) => Some((word, rest.trim())),
        None => Some((line, "")),
    }
}

fn required(rest: &str, usage: &str) -> Result<String> {
    if rest.is_empty() {
        return Err(CliError::InvalidArgument(format!("Usage: {}", usage)));
    }
    Ok(rest.to_string())
}

// ----------------------------------------------------------------------------
// Shell Loop
// ----------------------------------------------------------------------------

/// Run the shell until `quit` or end of input
pub async fn run(app: &mut NodeApp) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let prompt = app.config.cli.prompt.clone();

    println!("{}", HELP);
    print_prompt(&prompt).await?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("Shell input closed");
                    return Ok(());
                };
                match ShellCommand::parse(&line) {
                    Ok(Some(ShellCommand::Quit)) => return Ok(()),
                    Ok(Some(command)) => {
                        if let Err(e) = execute(app, command).await {
                            println!("error: {}", e);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => println!("{}", e),
                }
                print_prompt(&prompt).await?;
            }
            event = app.next_event() => {
                let (_, line) = event?;
                if let Some(line) = line {
                    println!("{}", line);
                }
            }
        }
    }
}

async fn print_prompt(prompt: &str) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(prompt.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

async fn execute(app: &NodeApp, command: ShellCommand) -> Result<()> {
    let runtime = app.runtime();
    match command {
        ShellCommand::Scan => runtime.start_scan().await?,
        ShellCommand::Stop => runtime.stop_scan().await?,
        ShellCommand::Devices => println!("{}", app.state.render_directory()),
        ShellCommand::Connect(target) => {
            let peripheral = app.state.resolve_device(&target)?;
            runtime.connect(peripheral).await?;
        }
        ShellCommand::Disconnect => runtime.disconnect().await?,
        ShellCommand::Sync => {
            app.send(CommandEnvelope::set_timestamp_now(&SystemTimeSource))
                .await?
        }
        ShellCommand::List => app.send(CommandEnvelope::RequestFilenameList).await?,
        ShellCommand::Notify => app.send(CommandEnvelope::RequestFilenameNotify).await?,
        ShellCommand::Get(filename) => {
            app.send(CommandEnvelope::RequestFileTransfer { filename })
                .await?
        }
        ShellCommand::Mode(mode) => app.send(CommandEnvelope::SetOperatingMode { mode }).await?,
        ShellCommand::Clear => app.send(CommandEnvelope::ClearMemory).await?,
        ShellCommand::Finish => runtime.finish_transfer().await?,
        ShellCommand::Save(path) => {
            let file = app
                .state
                .last_file
                .as_ref()
                .ok_or_else(|| CliError::InvalidArgument("No finished transfer to save".to_string()))?;
            let written = file.save(&path)?;
            println!("Wrote {} bytes to {}", written, path.display());
        }
        ShellCommand::Status => println!("{}", app.state.render_status()),
        ShellCommand::Log => println!("{}", app.state.log.render()),
        ShellCommand::Help => println!("{}", HELP),
        ShellCommand::Quit => {}
    }
    Ok(())
}
