//! Runtime Builder API
//!
//! Consumers (CLI, tests) hand the builder a [`BleCentral`], optionally a clock
//! and a log sink, and get back a [`RuntimeHandle`] for commands and app events.

use std::sync::Arc;

use nodelink_core::{
    AppEvent, BleCentral, Command, CommandEnvelope, EventLogSink, PeripheralId, Session,
    SessionConfig, SystemTimeSource, TimeSource, TracingSink,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::RuntimeConfig;
use crate::driver::SessionDriver;
use crate::error::RuntimeError;

// ----------------------------------------------------------------------------
// Runtime Builder
// ----------------------------------------------------------------------------

/// Builder for a session runtime over one BLE central
pub struct RuntimeBuilder<T, C = SystemTimeSource>
where
    T: BleCentral + 'static,
    C: TimeSource + Send + 'static,
{
    central: Arc<T>,
    clock: C,
    session_config: SessionConfig,
    runtime_config: RuntimeConfig,
    sinks: Vec<Box<dyn EventLogSink>>,
}

impl<T> RuntimeBuilder<T, SystemTimeSource>
where
    T: BleCentral + 'static,
{
    pub fn new(central: T) -> Self {
        Self::from_arc(Arc::new(central))
    }

    /// Share a central that the caller also keeps
    pub fn from_arc(central: Arc<T>) -> Self {
        Self {
            central,
            clock: SystemTimeSource,
            session_config: SessionConfig::default(),
            runtime_config: RuntimeConfig::default(),
            sinks: vec![Box::new(TracingSink)],
        }
    }
}

impl<T, C> RuntimeBuilder<T, C>
where
    T: BleCentral + 'static,
    C: TimeSource + Send + 'static,
{
    /// Replace the session clock
    pub fn with_clock<D>(self, clock: D) -> RuntimeBuilder<T, D>
    where
        D: TimeSource + Send + 'static,
    {
        RuntimeBuilder {
            central: self.central,
            clock,
            session_config: self.session_config,
            runtime_config: self.runtime_config,
            sinks: self.sinks,
        }
    }

    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    /// Also record every session log entry into `sink`. Entries always reach
    /// `tracing` and the app event stream.
    pub fn with_log_sink(mut self, sink: impl EventLogSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Spawn the driver on the current tokio runtime
    pub fn build_and_start(self) -> Result<RuntimeHandle, RuntimeError> {
        self.runtime_config.validate()?;

        let (command_tx, command_rx) = mpsc::channel(self.runtime_config.command_buffer_size);
        let (app_event_tx, app_event_rx) = mpsc::channel(self.runtime_config.app_event_buffer_size);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let session = Session::with_clock(self.session_config, self.clock);
        let driver = SessionDriver::new(
            session,
            self.central,
            self.runtime_config,
            command_rx,
            shutdown_rx,
            app_event_tx,
            self.sinks,
        );
        let driver_handle = tokio::spawn(driver.run());
        info!("Node runtime started");

        Ok(RuntimeHandle {
            command_sender: command_tx,
            app_event_receiver: Some(app_event_rx),
            shutdown: Some(shutdown_tx),
            driver_handle: Some(driver_handle),
        })
    }
}

// ----------------------------------------------------------------------------
// Runtime Handle
// ----------------------------------------------------------------------------

/// Handle to a running session runtime. Dropping it stops the driver.
pub struct RuntimeHandle {
    command_sender: mpsc::Sender<Command>,
    app_event_receiver: Option<mpsc::Receiver<AppEvent>>,
    shutdown: Option<oneshot::Sender<()>>,
    driver_handle: Option<JoinHandle<Result<(), RuntimeError>>>,
}

impl RuntimeHandle {
    /// Get a command sender for sending commands to the runtime
    pub fn command_sender(&self) -> mpsc::Sender<Command> {
        self.command_sender.clone()
    }

    /// Take the app event receiver (can only be called once)
    pub fn take_app_event_receiver(&mut self) -> Option<mpsc::Receiver<AppEvent>> {
        self.app_event_receiver.take()
    }

    pub async fn send_command(&self, command: Command) -> Result<(), RuntimeError> {
        if !self.is_running() {
            return Err(RuntimeError::Stopped);
        }
        self.command_sender
            .send(command)
            .await
            .map_err(|_| RuntimeError::ChannelClosed { channel: "command" })
    }

    pub async fn start_scan(&self) -> Result<(), RuntimeError> {
        self.send_command(Command::StartScan).await
    }

    pub async fn stop_scan(&self) -> Result<(), RuntimeError> {
        self.send_command(Command::StopScan).await
    }

    pub async fn connect(&self, peripheral: impl Into<PeripheralId>) -> Result<(), RuntimeError> {
        self.send_command(Command::Connect {
            peripheral: peripheral.into(),
        })
        .await
    }

    pub async fn disconnect(&self) -> Result<(), RuntimeError> {
        self.send_command(Command::Disconnect).await
    }

    pub async fn send(&self, envelope: CommandEnvelope) -> Result<(), RuntimeError> {
        self.send_command(Command::Send { envelope }).await
    }

    pub async fn finish_transfer(&self) -> Result<(), RuntimeError> {
        self.send_command(Command::FinishTransfer).await
    }

    /// Check if the driver is still running
    pub fn is_running(&self) -> bool {
        self.driver_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop scanning or disconnect as needed, then wait for the driver to exit
    pub async fn shutdown(&mut self) -> Result<(), RuntimeError> {
        if let Some(shutdown) = self.shutdown.take() {
            // The driver may already be gone; joining below reports how it ended
            let _ = shutdown.send(());
        }
        match self.driver_handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| RuntimeError::TaskFailed(e.to_string()))?,
            None => Ok(()),
        }
    }
}
