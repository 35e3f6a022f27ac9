//! Session Driver
//!
//! The driver is the only task that touches the [`Session`]. Commands from the
//! handle, transport results and timer deadlines are multiplexed in a single
//! `select!` loop and applied one at a time. Every [`Effect`] that needs the
//! radio runs on a spawned task that reports back through the ingress queue,
//! so a slow peripheral never stalls the loop.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use nodelink_core::{
    AppEvent, BleCentral, Command, ConnectedChannel, Discovery, Effect, Event, EventLogSink,
    Output, PeripheralId, Session, SessionState, SystemTimeSource, TimeSource,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;

// ----------------------------------------------------------------------------
// Ingress
// ----------------------------------------------------------------------------

/// Messages posted to the driver by its spawned tasks
pub(crate) enum Ingress {
    Event(Event),
    /// A connection attempt produced a channel; the driver decides whether it is still wanted
    Connected {
        peripheral: PeripheralId,
        channel: Arc<dyn ConnectedChannel>,
    },
}

type IngressSender = mpsc::Sender<Ingress>;

async fn forward(tx: &IngressSender, ingress: Ingress) -> bool {
    if tx.send(ingress).await.is_err() {
        debug!("Driver stopped, dropping transport result");
        return false;
    }
    true
}

// ----------------------------------------------------------------------------
// Transport Tasks
// ----------------------------------------------------------------------------

/// Spawned work tied to the radio and the current connection
#[derive(Default)]
struct TransportTasks {
    scan: Option<JoinHandle<()>>,
    stopping: Option<JoinHandle<()>>,
    link_watch: Option<JoinHandle<()>>,
    channel: Option<Arc<dyn ConnectedChannel>>,
    subscriptions: HashMap<Uuid, JoinHandle<()>>,
}

impl TransportTasks {
    fn abort_scan(&mut self) {
        if let Some(scan) = self.scan.take() {
            scan.abort();
        }
    }

    /// Drop everything tied to the connection, returning the channel if there was one
    fn release_connection(&mut self) -> Option<Arc<dyn ConnectedChannel>> {
        for (characteristic, task) in self.subscriptions.drain() {
            debug!("Cancelling subscription to {}", characteristic);
            task.abort();
        }
        self.channel.take()
    }

    fn abort_all(&mut self) {
        self.abort_scan();
        if let Some(stopping) = self.stopping.take() {
            stopping.abort();
        }
        if let Some(watch) = self.link_watch.take() {
            watch.abort();
        }
        self.release_connection();
    }
}

// ----------------------------------------------------------------------------
// Session Driver
// ----------------------------------------------------------------------------

/// Runs a [`Session`] against a [`BleCentral`]
pub struct SessionDriver<T, C = SystemTimeSource>
where
    T: BleCentral + 'static,
    C: TimeSource + Send + 'static,
{
    session: Session<C>,
    central: Arc<T>,
    config: RuntimeConfig,
    commands: mpsc::Receiver<Command>,
    shutdown: oneshot::Receiver<()>,
    ingress_tx: IngressSender,
    ingress_rx: mpsc::Receiver<Ingress>,
    app_events: mpsc::Sender<AppEvent>,
    sinks: Vec<Box<dyn EventLogSink>>,
    tasks: TransportTasks,
    observer_closed: bool,
}

impl<T, C> SessionDriver<T, C>
where
    T: BleCentral + 'static,
    C: TimeSource + Send + 'static,
{
    pub(crate) fn new(
        session: Session<C>,
        central: Arc<T>,
        config: RuntimeConfig,
        commands: mpsc::Receiver<Command>,
        shutdown: oneshot::Receiver<()>,
        app_events: mpsc::Sender<AppEvent>,
        sinks: Vec<Box<dyn EventLogSink>>,
    ) -> Self {
        let (ingress_tx, ingress_rx) = mpsc::channel(config.event_buffer_size);
        Self {
            session,
            central,
            config,
            commands,
            shutdown,
            ingress_tx,
            ingress_rx,
            app_events,
            sinks,
            tasks: TransportTasks::default(),
            observer_closed: false,
        }
    }

    /// Run until shutdown is requested or every command sender is gone
    pub async fn run(mut self) -> Result<(), RuntimeError> {
        info!("Session driver starting");
        self.watch_link_loss().await;
        self.refresh_radio_state().await;

        loop {
            let deadline = self.session.next_deadline();
            let wait = deadline
                .map(|at| at.saturating_duration_since(self.session.now()))
                .unwrap_or_default();

            tokio::select! {
                _ = &mut self.shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.dispatch_command(command).await,
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                },
                Some(ingress) = self.ingress_rx.recv() => self.dispatch_ingress(ingress).await,
                _ = sleep(wait), if deadline.is_some() => self.dispatch_event(Event::Tick).await,
            }
        }

        self.wind_down().await;
        info!("Session driver stopped");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    async fn dispatch_command(&mut self, command: Command) {
        debug!("Command: {:?}", command);
        if matches!(command, Command::StartScan) {
            self.refresh_radio_state().await;
        }
        let output = self.session.handle_command(command);
        self.apply(output).await;
    }

    async fn dispatch_event(&mut self, event: Event) {
        let output = self.session.handle_event(event);
        self.apply(output).await;
    }

    async fn dispatch_ingress(&mut self, ingress: Ingress) {
        match ingress {
            Ingress::Event(event) => self.dispatch_event(event).await,
            Ingress::Connected {
                peripheral,
                channel,
            } => {
                let wanted = self.session.state() == SessionState::Connecting
                    && self
                        .session
                        .target()
                        .is_some_and(|target| target.id == peripheral);
                if !wanted {
                    debug!("Dropping late connection to {}", peripheral);
                    tokio::spawn(async move {
                        if let Err(e) = channel.disconnect().await {
                            warn!("Failed to drop late connection: {}", e);
                        }
                    });
                    return;
                }

                self.tasks.channel = Some(channel);
                self.dispatch_event(Event::ConnectResult {
                    peripheral,
                    result: Ok(()),
                })
                .await;
            }
        }
    }

    /// Execute effects, then publish app events in order
    async fn apply(&mut self, output: Output) {
        for effect in output.effects {
            self.execute(effect).await;
        }
        if !self.session.state().is_connected() && self.tasks.channel.is_some() {
            debug!("Session left the connection, releasing transport resources");
            self.tasks.release_connection();
        }
        for event in output.app_events {
            self.publish(event).await;
        }
    }

    async fn publish(&mut self, event: AppEvent) {
        if let AppEvent::Log(entry) = &event {
            for sink in &mut self.sinks {
                sink.record(entry);
            }
        }
        if self.observer_closed {
            return;
        }
        if self.app_events.send(event).await.is_err() {
            debug!("App event receiver dropped");
            self.observer_closed = true;
        }
    }

    // ------------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------------

    async fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::StartScan { service } => self.start_scan(service),
            Effect::StopScan => {
                self.tasks.abort_scan();
                let central = Arc::clone(&self.central);
                self.tasks.stopping = Some(tokio::spawn(async move {
                    if let Err(e) = central.stop_scan().await {
                        warn!("Failed to stop scan: {}", e);
                    }
                }));
            }
            Effect::Connect { handle } => {
                let central = Arc::clone(&self.central);
                let tx = self.ingress_tx.clone();
                let limit = self.config.connect_timeout;
                tokio::spawn(async move {
                    let peripheral = handle.id.clone();
                    let ingress = match timeout(limit, central.connect(&handle)).await {
                        Ok(Ok(channel)) => Ingress::Connected {
                            peripheral,
                            channel,
                        },
                        Ok(Err(e)) => Ingress::Event(Event::ConnectResult {
                            peripheral,
                            result: Err(e.to_string()),
                        }),
                        Err(_) => Ingress::Event(Event::ConnectResult {
                            peripheral,
                            result: Err(format!("timed out after {:?}", limit)),
                        }),
                    };
                    forward(&tx, ingress).await;
                });
            }
            Effect::DiscoverServices => {
                let Some(channel) = self.channel() else {
                    self.post(Event::ServiceList {
                        result: Err("not connected".to_string()),
                    });
                    return;
                };
                let tx = self.ingress_tx.clone();
                tokio::spawn(async move {
                    let result = channel.discover_services().await.map_err(|e| e.to_string());
                    forward(&tx, Ingress::Event(Event::ServiceList { result })).await;
                });
            }
            Effect::DiscoverCharacteristics { service } => {
                let Some(channel) = self.channel() else {
                    self.post(Event::CharacteristicList {
                        result: Err("not connected".to_string()),
                    });
                    return;
                };
                let tx = self.ingress_tx.clone();
                tokio::spawn(async move {
                    let result = channel
                        .discover_characteristics(service)
                        .await
                        .map_err(|e| e.to_string());
                    forward(&tx, Ingress::Event(Event::CharacteristicList { result })).await;
                });
            }
            Effect::Subscribe { characteristic } => self.subscribe(characteristic),
            Effect::Write {
                characteristic,
                payload,
                require_ack,
            } => {
                let Some(channel) = self.channel() else {
                    self.post(Event::WriteResult {
                        characteristic,
                        result: Err("not connected".to_string()),
                    });
                    return;
                };
                let tx = self.ingress_tx.clone();
                tokio::spawn(async move {
                    let result = channel
                        .write(characteristic, &payload, require_ack)
                        .await
                        .map_err(|e| e.to_string());
                    forward(
                        &tx,
                        Ingress::Event(Event::WriteResult {
                            characteristic,
                            result,
                        }),
                    )
                    .await;
                });
            }
            Effect::Disconnect { peripheral } => match self.tasks.release_connection() {
                Some(channel) => {
                    tokio::spawn(async move {
                        if let Err(e) = channel.disconnect().await {
                            warn!("Failed to disconnect from {}: {}", peripheral, e);
                        }
                    });
                }
                None => debug!("No channel to disconnect for {}", peripheral),
            },
        }
    }

    fn start_scan(&mut self, service: Uuid) {
        self.tasks.abort_scan();
        let stopping = self.tasks.stopping.take();
        let central = Arc::clone(&self.central);
        let tx = self.ingress_tx.clone();
        self.tasks.scan = Some(tokio::spawn(async move {
            // A stop still in flight must not land after the new scan started
            if let Some(stopping) = stopping {
                let _ = stopping.await;
            }
            let mut discoveries = match central.scan(service).await {
                Ok(discoveries) => discoveries,
                Err(e) => {
                    warn!("Failed to start scan: {}", e);
                    let reason = e.to_string();
                    forward(&tx, Ingress::Event(Event::ScanFailed { reason })).await;
                    return;
                }
            };
            while let Some(Discovery { handle, rssi }) = discoveries.next().await {
                let event = Event::PeripheralDiscovered { handle, rssi };
                if !forward(&tx, Ingress::Event(event)).await {
                    break;
                }
            }
        }));
    }

    fn subscribe(&mut self, characteristic: Uuid) {
        let Some(channel) = self.channel() else {
            self.post(Event::NotifyError {
                characteristic,
                error: "not connected".to_string(),
            });
            return;
        };
        let tx = self.ingress_tx.clone();
        let task = tokio::spawn(async move {
            let mut notifications = match channel.subscribe(characteristic).await {
                Ok(notifications) => notifications,
                Err(e) => {
                    let error = e.to_string();
                    forward(&tx, Ingress::Event(Event::NotifyError { characteristic, error })).await;
                    return;
                }
            };
            while let Some(item) = notifications.next().await {
                let event = match item {
                    Ok(value) => Event::NotifyValue {
                        characteristic,
                        value,
                    },
                    Err(e) => Event::NotifyError {
                        characteristic,
                        error: e.to_string(),
                    },
                };
                if !forward(&tx, Ingress::Event(event)).await {
                    break;
                }
            }
            debug!("Notification stream for {} ended", characteristic);
        });
        if let Some(previous) = self.tasks.subscriptions.insert(characteristic, task) {
            previous.abort();
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn channel(&self) -> Option<Arc<dyn ConnectedChannel>> {
        self.tasks.channel.clone()
    }

    /// Queue an event from inside the loop without waiting on our own queue
    fn post(&self, event: Event) {
        let tx = self.ingress_tx.clone();
        tokio::spawn(async move {
            forward(&tx, Ingress::Event(event)).await;
        });
    }

    async fn refresh_radio_state(&mut self) {
        let state = self.central.radio_state().await;
        if state != self.session.radio_state() {
            self.dispatch_event(Event::RadioStateChanged { state }).await;
        }
    }

    async fn watch_link_loss(&mut self) {
        let mut lost = match self.central.disconnections().await {
            Ok(lost) => lost,
            Err(e) => {
                warn!("Link loss notifications unavailable: {}", e);
                return;
            }
        };
        let tx = self.ingress_tx.clone();
        self.tasks.link_watch = Some(tokio::spawn(async move {
            while let Some(peripheral) = lost.next().await {
                if !forward(&tx, Ingress::Event(Event::ConnectionLost { peripheral })).await {
                    break;
                }
            }
        }));
    }

    /// Leave the radio the way we found it
    async fn wind_down(&mut self) {
        match self.session.state() {
            SessionState::Scanning => {
                let output = self.session.handle_command(Command::StopScan);
                self.apply(output).await;
            }
            state if state.is_connected() => {
                let output = self.session.handle_command(Command::Disconnect);
                self.apply(output).await;
            }
            _ => {}
        }
        if let Some(stopping) = self.tasks.stopping.take() {
            let _ = stopping.await;
        }
        self.tasks.abort_all();
    }
}

impl<T, C> Drop for SessionDriver<T, C>
where
    T: BleCentral + 'static,
    C: TimeSource + Send + 'static,
{
    fn drop(&mut self) {
        self.tasks.abort_all();
    }
}
