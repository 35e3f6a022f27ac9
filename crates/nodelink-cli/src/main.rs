//! Nodelink CLI - main entry point

use anyhow::Context;
use clap::Parser;
use tracing::info;

use nodelink_cli::{cli::Cli, commands::CommandDispatcher, config::CliAppConfig, NodeApp};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose);

    // Load configuration, then apply flag overrides
    let config = CliAppConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?
        .with_overrides(cli.scan_timeout, cli.adapter);
    config.validate().context("Invalid configuration")?;

    let app = NodeApp::new(config)
        .await
        .context("Failed to start BLE session")?;

    CommandDispatcher::execute(cli.command, app)
        .await
        .context("Command execution failed")?;

    info!("Nodelink CLI exited successfully");
    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
