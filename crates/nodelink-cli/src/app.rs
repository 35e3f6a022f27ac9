//! Nodelink application: a running session plus the client-side state it feeds

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

use nodelink_ble::BtleplugCentral;
use nodelink_core::{AppEvent, BleCentral, CommandEnvelope, LogLevel, PeripheralId, SessionState};
use nodelink_runtime::{RuntimeBuilder, RuntimeHandle};

use crate::config::CliAppConfig;
use crate::error::{CliError, Result};
use crate::state::{ClientState, CompletedFile};

pub struct NodeApp {
    pub config: CliAppConfig,
    pub state: ClientState,
    runtime: RuntimeHandle,
    events: mpsc::Receiver<AppEvent>,
}

impl NodeApp {
    /// Bring up the BLE adapter and start the session runtime
    pub async fn new(config: CliAppConfig) -> Result<Self> {
        let central = BtleplugCentral::new(config.ble.clone()).await?;
        Self::with_central(config, central)
    }

    /// Start the session runtime over any central
    pub fn with_central<T: BleCentral + 'static>(config: CliAppConfig, central: T) -> Result<Self> {
        let mut runtime = RuntimeBuilder::new(central)
            .with_session_config(config.session.clone())
            .with_runtime_config(config.runtime.clone())
            .build_and_start()?;
        let events = runtime
            .take_app_event_receiver()
            .ok_or(CliError::EventStreamClosed)?;
        info!("Nodelink session started");

        Ok(Self {
            state: ClientState::new(&config.log),
            config,
            runtime,
            events,
        })
    }

    pub fn runtime(&self) -> &RuntimeHandle {
        &self.runtime
    }

    /// Wait for the next app event and fold it into the state
    pub async fn next_event(&mut self) -> Result<(AppEvent, Option<String>)> {
        let event = self.events.recv().await.ok_or(CliError::EventStreamClosed)?;
        debug!("App event: {}", event.kind());
        let line = self.state.apply(&event);
        Ok((event, line))
    }

    /// Consume events until `predicate` picks one or `limit` passes.
    /// Warnings and errors from the session end the wait early.
    pub async fn wait_for<F>(&mut self, what: &str, limit: Duration, mut predicate: F) -> Result<AppEvent>
    where
        F: FnMut(&AppEvent) -> bool,
    {
        let deadline = Instant::now() + limit;
        loop {
            let (event, line) = timeout_at(deadline, self.next_event())
                .await
                .map_err(|_| CliError::Timeout(what.to_string()))??;
            if predicate(&event) {
                return Ok(event);
            }
            if let AppEvent::Log(entry) = &event {
                if entry.level >= LogLevel::Warn {
                    return Err(CliError::Device(entry.message.clone()));
                }
            }
            if let Some(line) = line {
                debug!("{}", line);
            }
        }
    }

    /// Scan until `device` shows up, then connect and wait for all endpoints
    pub async fn connect_ready(&mut self, device: &PeripheralId) -> Result<()> {
        let limit = self.config.cli.ready_timeout();

        self.runtime.start_scan().await?;
        self.wait_for(&format!("device {}", device), limit, |event| {
            matches!(event, AppEvent::DeviceDiscovered { handle, .. } if &handle.id == device)
        })
        .await?;

        self.runtime.connect(device.clone()).await?;
        self.wait_for("service discovery", limit, |event| {
            matches!(event, AppEvent::StateChanged { to: SessionState::Ready, .. })
        })
        .await?;
        Ok(())
    }

    pub async fn send(&self, envelope: CommandEnvelope) -> Result<()> {
        self.runtime.send(envelope).await?;
        Ok(())
    }

    /// Receive a requested file until no data arrives for `idle`, then finish the transfer
    pub async fn download(&mut self, filename: &str, idle: Duration) -> Result<CompletedFile> {
        self.send(CommandEnvelope::RequestFileTransfer {
            filename: filename.to_string(),
        })
        .await?;

        let response_timeout = self.config.cli.response_timeout();
        self.wait_for("transfer start", response_timeout, |event| {
            matches!(event, AppEvent::TransferStarted { .. })
        })
        .await?;

        // The first chunk may take longer than the gap between chunks
        let mut limit = response_timeout.max(idle);
        loop {
            let chunk = self
                .wait_for("file data", limit, |event| {
                    matches!(event, AppEvent::FileBytesAppended { .. })
                })
                .await;
            match chunk {
                Ok(_) => limit = idle,
                Err(CliError::Timeout(_)) => break,
                Err(e) => return Err(e),
            }
        }

        self.runtime.finish_transfer().await?;
        self.wait_for("transfer completion", response_timeout, |event| {
            matches!(event, AppEvent::TransferFinished { .. })
        })
        .await?;
        self.state
            .last_file
            .clone()
            .ok_or_else(|| CliError::Device("transfer produced no file".to_string()))
    }

    /// Disconnect if connected and stop the runtime
    pub async fn stop(mut self) -> Result<()> {
        if self.state.session_state.is_connected() {
            self.runtime.disconnect().await?;
        }
        self.runtime.shutdown().await?;
        info!("Nodelink session stopped");
        Ok(())
    }
}
