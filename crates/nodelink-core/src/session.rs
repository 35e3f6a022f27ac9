//! Session State Machine
//!
//! Owns the connection lifecycle for a single peripheral:
//!
//! ```text
//! Idle → Scanning → Connecting → DiscoveringServices → DiscoveringCharacteristics → Ready
//!   ↑        │           │                │                        │                 │
//!   └────────┴───────────┴────────────────┴────────────────────────┴─────────────────┘
//!            timeout, failure, link loss or disconnect
//! ```
//!
//! The session is a plain value. [`Session::handle_command`] and
//! [`Session::handle_event`] take one message, update state and return an
//! [`Output`] listing the effects for the transport and the events for
//! observers. Callers must feed messages from a single queue.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channel::{AppEvent, Command, Effect, Event};
use crate::config::SessionConfig;
use crate::directory::{DeviceDirectory, Sighting};
use crate::errors::{Result, SessionError};
use crate::log::{LogEntry, LogLevel};
use crate::protocol::{
    self, CommandEnvelope, EndpointRole, EndpointSet, FileTransferBuffer, InboundPayload,
    NODE_SERVICE_UUID,
};
use crate::timers::{TimerKey, Timers};
use crate::types::{PeripheralHandle, PeripheralId, RadioState, SystemTimeSource, TimeSource, Timestamp};

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    DiscoveringServices,
    DiscoveringCharacteristics,
    Ready,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Scanning => "Scanning",
            SessionState::Connecting => "Connecting",
            SessionState::DiscoveringServices => "DiscoveringServices",
            SessionState::DiscoveringCharacteristics => "DiscoveringCharacteristics",
            SessionState::Ready => "Ready",
        }
    }

    /// A peripheral is connected or a connection attempt is underway
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting
                | SessionState::DiscoveringServices
                | SessionState::DiscoveringCharacteristics
                | SessionState::Ready
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ----------------------------------------------------------------------------
// Output
// ----------------------------------------------------------------------------

/// What one command or event produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    /// Work for the transport driver, in order
    pub effects: Vec<Effect>,
    /// Notifications for observers, in order
    pub app_events: Vec<AppEvent>,
}

impl Output {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty() && self.app_events.is_empty()
    }

    pub fn extend(&mut self, other: Output) {
        self.effects.extend(other.effects);
        self.app_events.extend(other.app_events);
    }

    /// Log entries contained in this output
    pub fn log_entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.app_events.iter().filter_map(|event| match event {
            AppEvent::Log(entry) => Some(entry),
            _ => None,
        })
    }

    fn effect(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    fn emit(&mut self, event: AppEvent) {
        self.app_events.push(event);
    }
}

/// Counters for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub state_transitions: u64,
    pub commands_sent: u64,
    pub notifications_received: u64,
    pub notifications_ignored: u64,
    pub bytes_received: u64,
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// BLE session with one node peripheral
pub struct Session<C: TimeSource = SystemTimeSource> {
    config: SessionConfig,
    clock: C,
    state: SessionState,
    radio: RadioState,
    directory: DeviceDirectory,
    timers: Timers,
    /// Peripheral being connected to or connected
    target: Option<PeripheralHandle>,
    endpoints: EndpointSet,
    /// Reassembly buffers keyed by the endpoint that delivered the bytes
    buffers: HashMap<EndpointRole, FileTransferBuffer>,
    pending_transfer: Option<String>,
    stats: SessionStats,
}

impl Session<SystemTimeSource> {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_clock(config, SystemTimeSource)
    }
}

impl<C: TimeSource> Session<C> {
    pub fn with_clock(config: SessionConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            state: SessionState::Idle,
            radio: RadioState::Unknown,
            directory: DeviceDirectory::new(),
            timers: Timers::new(),
            target: None,
            endpoints: EndpointSet::new(),
            buffers: HashMap::new(),
            pending_transfer: None,
            stats: SessionStats::default(),
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn radio_state(&self) -> RadioState {
        self.radio
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn directory(&self) -> &DeviceDirectory {
        &self.directory
    }

    pub fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    /// Peripheral being connected to or connected
    pub fn target(&self) -> Option<&PeripheralHandle> {
        self.target.as_ref()
    }

    /// Filename of the transfer in progress
    pub fn pending_transfer(&self) -> Option<&str> {
        self.pending_transfer.as_deref()
    }

    /// Buffer receiving file-transfer notifications
    pub fn transfer_buffer(&self) -> Option<&FileTransferBuffer> {
        self.buffers.get(&EndpointRole::FileTransfer)
    }

    pub fn buffer(&self, role: EndpointRole) -> Option<&FileTransferBuffer> {
        self.buffers.get(&role)
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Current time on the session clock
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// When the driver should deliver the next `Tick`
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.timers.next_deadline()
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Apply a UI command. Rejections are reported as log entries, never returned.
    pub fn handle_command(&mut self, command: Command) -> Output {
        let result = match command {
            Command::StartScan => self.start_scan(),
            Command::StopScan => self.stop_scan(),
            Command::Connect { peripheral } => self.connect(&peripheral),
            Command::Disconnect => Ok(self.disconnect()),
            Command::Send { envelope } => self.send(envelope),
            Command::FinishTransfer => Ok(self.finish_transfer()),
        };

        result.unwrap_or_else(|error| {
            let mut out = Output::new();
            self.log(&mut out, error.log_level(), error.to_string());
            out
        })
    }

    /// Apply one ingress event
    pub fn handle_event(&mut self, event: Event) -> Output {
        match event {
            Event::Tick => self.tick(),
            Event::RadioStateChanged { state } => self.on_radio_state(state),
            Event::ScanFailed { reason } => self.on_scan_failed(reason),
            Event::PeripheralDiscovered { handle, rssi } => self.on_discovered(handle, rssi),
            Event::ConnectResult { peripheral, result } => self.on_connect_result(peripheral, result),
            Event::ServiceList { result } => self.on_service_list(result),
            Event::CharacteristicList { result } => self.on_characteristic_list(result),
            Event::NotifyValue {
                characteristic,
                value,
            } => self.on_notify(characteristic, value),
            Event::NotifyError {
                characteristic,
                error,
            } => self.on_notify_error(characteristic, error),
            Event::WriteResult {
                characteristic,
                result,
            } => self.on_write_result(characteristic, result),
            Event::ConnectionLost { peripheral } => self.on_connection_lost(peripheral),
        }
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Start scanning for node peripherals. Valid only from `Idle`.
    pub fn start_scan(&mut self) -> Result<Output> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState {
                operation: "start scan",
                state: self.state,
            });
        }
        if !self.radio.is_ready() {
            return Err(SessionError::RadioUnavailable { state: self.radio });
        }

        let mut out = Output::new();
        self.timers.cancel(TimerKey::VisibilityWindow);
        self.clear_directory(&mut out);

        let deadline = self.clock.now() + self.config.scan_timeout;
        self.timers.arm(TimerKey::ScanTimeout, deadline);

        out.effect(Effect::StartScan {
            service: NODE_SERVICE_UUID,
        });
        self.transition(&mut out, SessionState::Scanning);
        self.log(&mut out, LogLevel::Info, "Scanning for node devices");
        Ok(out)
    }

    /// Stop an in-flight scan and open the visibility window
    pub fn stop_scan(&mut self) -> Result<Output> {
        if self.state != SessionState::Scanning {
            return Err(SessionError::InvalidState {
                operation: "stop scan",
                state: self.state,
            });
        }

        let mut out = Output::new();
        self.end_scan(&mut out);
        self.log(&mut out, LogLevel::Info, "Scan stopped");
        Ok(out)
    }

    /// Connect to `peripheral`. Valid from `Idle` or `Scanning`; a scan is always stopped first.
    pub fn connect(&mut self, peripheral: &PeripheralId) -> Result<Output> {
        if !matches!(self.state, SessionState::Idle | SessionState::Scanning) {
            return Err(SessionError::InvalidState {
                operation: "connect",
                state: self.state,
            });
        }

        let mut out = Output::new();
        self.timers.cancel(TimerKey::VisibilityWindow);
        self.timers.cancel(TimerKey::ScanTimeout);
        if self.state == SessionState::Scanning {
            out.effect(Effect::StopScan);
        }

        // Bindings from any earlier connection are void from here on
        self.endpoints.clear();
        self.reset_buffers();
        self.pending_transfer = None;

        let handle = self
            .directory
            .get(peripheral)
            .map(|entry| entry.handle.clone())
            .unwrap_or_else(|| PeripheralHandle::new(peripheral.clone(), None));
        let message = format!("Connecting to {}", handle);
        self.target = Some(handle.clone());

        out.effect(Effect::Connect { handle });
        self.transition(&mut out, SessionState::Connecting);
        self.log(&mut out, LogLevel::Info, message);
        Ok(out)
    }

    /// Drop the current connection. Idempotent.
    pub fn disconnect(&mut self) -> Output {
        let mut out = Output::new();
        if !self.state.is_connected() {
            tracing::debug!("Disconnect ignored while {}", self.state);
            return out;
        }

        if let Some(target) = &self.target {
            out.effect(Effect::Disconnect {
                peripheral: target.id.clone(),
            });
        }
        let message = match &self.target {
            Some(target) => format!("Disconnected from {}", target),
            None => "Disconnected".to_string(),
        };
        self.teardown(&mut out);
        self.log(&mut out, LogLevel::Info, message);
        out
    }

    /// Encode `envelope` and write it to its endpoint
    pub fn send(&mut self, envelope: CommandEnvelope) -> Result<Output> {
        let write = envelope.to_write();
        let characteristic = self
            .endpoints
            .get(write.role)
            .ok_or(SessionError::EndpointUnavailable { role: write.role })?;

        let mut out = Output::new();
        if let CommandEnvelope::RequestFileTransfer { filename } = &envelope {
            self.buffers
                .entry(EndpointRole::FileTransfer)
                .or_default()
                .reset(Some(filename.clone()));
            self.pending_transfer = Some(filename.clone());
            out.emit(AppEvent::TransferStarted {
                filename: filename.clone(),
            });
        }

        let message = format!(
            "Sent {} to {}: {}",
            envelope.name(),
            write.role,
            String::from_utf8_lossy(&write.payload)
        );
        out.effect(Effect::Write {
            characteristic,
            payload: write.payload,
            require_ack: write.require_ack,
        });
        self.stats.commands_sent += 1;
        self.log(&mut out, LogLevel::Info, message);
        Ok(out)
    }

    /// Close the current transfer and report what was received. The bytes stay readable.
    pub fn finish_transfer(&mut self) -> Output {
        let mut out = Output::new();
        let filename = self.pending_transfer.take();
        let buffer = self.buffers.get(&EndpointRole::FileTransfer);
        let bytes = buffer.map(|b| b.as_bytes().to_vec()).unwrap_or_default();

        if filename.is_none() && bytes.is_empty() {
            tracing::debug!("No transfer to finish");
            return out;
        }

        let message = format!(
            "Transfer of {} finished: {} bytes",
            filename.as_deref().unwrap_or("unnamed file"),
            bytes.len()
        );
        out.emit(AppEvent::TransferFinished {
            filename,
            hex: protocol::hex_projection(&bytes),
            bytes,
        });
        self.log(&mut out, LogLevel::Info, message);
        out
    }

    /// Fire every timer that is due
    pub fn tick(&mut self) -> Output {
        let mut out = Output::new();
        for key in self.timers.take_due(self.clock.now()) {
            match key {
                TimerKey::ScanTimeout => {
                    if self.state == SessionState::Scanning {
                        self.end_scan(&mut out);
                        self.log(&mut out, LogLevel::Info, "Scan timed out");
                    }
                }
                TimerKey::VisibilityWindow => {
                    let removed = self.clear_directory(&mut out);
                    if removed > 0 {
                        self.log(
                            &mut out,
                            LogLevel::Info,
                            format!("Removed {} discovered devices", removed),
                        );
                    }
                }
            }
        }
        out
    }

    // ------------------------------------------------------------------------
    // Event Handlers
    // ------------------------------------------------------------------------

    fn on_radio_state(&mut self, state: RadioState) -> Output {
        let mut out = Output::new();
        if self.radio == state {
            return out;
        }
        self.radio = state;
        self.log(&mut out, LogLevel::Info, format!("Bluetooth radio {}", state));

        if state.is_ready() {
            return out;
        }
        match self.state {
            SessionState::Scanning => self.end_scan(&mut out),
            s if s.is_connected() => {
                self.teardown(&mut out);
                self.log(&mut out, LogLevel::Warn, "Connection dropped: radio unavailable");
            }
            _ => {}
        }
        out
    }

    fn on_scan_failed(&mut self, reason: String) -> Output {
        let mut out = Output::new();
        if self.state != SessionState::Scanning {
            tracing::debug!("Ignoring scan failure while {}: {}", self.state, reason);
            return out;
        }

        self.end_scan(&mut out);
        let error = SessionError::ScanFailed { reason };
        self.log(&mut out, error.log_level(), error.to_string());
        out
    }

    fn on_discovered(&mut self, handle: PeripheralHandle, rssi: Option<i16>) -> Output {
        let mut out = Output::new();
        if self.state != SessionState::Scanning {
            tracing::debug!("Ignoring sighting of {} while {}", handle.id, self.state);
            return out;
        }

        let sighting = self.directory.record(handle.clone(), rssi, self.clock.now());
        let new = sighting == Sighting::New;
        if new {
            self.log(&mut out, LogLevel::Info, format!("Discovered {}", handle));
        }
        out.emit(AppEvent::DeviceDiscovered { handle, rssi, new });
        out
    }

    fn on_connect_result(&mut self, peripheral: PeripheralId, result: std::result::Result<(), String>) -> Output {
        let mut out = Output::new();
        if self.state != SessionState::Connecting || !self.is_target(&peripheral) {
            tracing::debug!("Ignoring stale connect result for {}", peripheral);
            return out;
        }

        match result {
            Ok(()) => {
                self.reset_buffers();
                self.transition(&mut out, SessionState::DiscoveringServices);
                // A connection always halts scanning before discovery begins
                out.effect(Effect::StopScan);
                out.effect(Effect::DiscoverServices);
                self.log(&mut out, LogLevel::Info, format!("Connected to {}", peripheral));
            }
            Err(reason) => {
                let error = SessionError::ConnectFailed { peripheral, reason };
                self.teardown(&mut out);
                self.log(&mut out, error.log_level(), error.to_string());
            }
        }
        out
    }

    fn on_service_list(&mut self, result: std::result::Result<Vec<Uuid>, String>) -> Output {
        let mut out = Output::new();
        if self.state != SessionState::DiscoveringServices {
            tracing::debug!("Ignoring service list while {}", self.state);
            return out;
        }

        match result {
            Ok(services) if services.contains(&NODE_SERVICE_UUID) => {
                self.transition(&mut out, SessionState::DiscoveringCharacteristics);
                out.effect(Effect::DiscoverCharacteristics {
                    service: NODE_SERVICE_UUID,
                });
                self.log(&mut out, LogLevel::Info, "Discovered node service");
            }
            Ok(services) => self.discovery_failed(
                &mut out,
                format!("node service not found among {} services", services.len()),
            ),
            Err(reason) => self.discovery_failed(&mut out, reason),
        }
        out
    }

    fn on_characteristic_list(&mut self, result: std::result::Result<Vec<Uuid>, String>) -> Output {
        let mut out = Output::new();
        if self.state != SessionState::DiscoveringCharacteristics {
            tracing::debug!("Ignoring characteristic list while {}", self.state);
            return out;
        }

        let characteristics = match result {
            Ok(characteristics) => characteristics,
            Err(reason) => {
                self.discovery_failed(&mut out, reason);
                return out;
            }
        };

        for uuid in characteristics {
            match self.endpoints.bind(uuid) {
                Some(role) => {
                    tracing::debug!("Bound {} characteristic {}", role, uuid);
                    if role.notifies() {
                        out.effect(Effect::Subscribe {
                            characteristic: uuid,
                        });
                    }
                }
                None => tracing::debug!("Ignoring unknown characteristic {}", uuid),
            }
        }

        self.transition(&mut out, SessionState::Ready);
        let message = format!(
            "Ready: {} of {} characteristics available",
            self.endpoints.len(),
            EndpointRole::ALL.len()
        );
        self.log(&mut out, LogLevel::Info, message);
        out
    }

    fn on_notify(&mut self, characteristic: Uuid, value: Vec<u8>) -> Output {
        let mut out = Output::new();
        let role = match self.bound_role(&characteristic) {
            Some(role) => role,
            None => {
                // Notifications can still be in flight after a disconnect
                self.stats.notifications_ignored += 1;
                tracing::debug!("Ignoring notification from {} while {}", characteristic, self.state);
                return out;
            }
        };

        self.stats.notifications_received += 1;
        self.stats.bytes_received += value.len() as u64;

        match protocol::decode(&value) {
            InboundPayload::Listing { text, listing } => {
                let message = format!("Received filenames: {}", listing.filenames().join(", "));
                out.emit(AppEvent::TextReceived { role, text });
                out.emit(AppEvent::FilenamesReceived {
                    first: listing.first().map(str::to_string),
                    filenames: listing.into_filenames(),
                });
                self.log(&mut out, LogLevel::Info, message);
            }
            // File data may be any byte sequence, printable or not
            _ if role == EndpointRole::FileTransfer => {
                let buffer = self.buffers.entry(role).or_default();
                buffer.append(&value);
                let total_len = buffer.len();
                tracing::debug!("Appended {} bytes to transfer ({} total)", value.len(), total_len);
                out.emit(AppEvent::FileBytesAppended {
                    role,
                    chunk_hex: protocol::hex_projection(&value),
                    total_len,
                });
            }
            InboundPayload::Text(text) => {
                let message = format!("Received from {}: {}", role, text);
                out.emit(AppEvent::TextReceived { role, text });
                self.log(&mut out, LogLevel::Info, message);
            }
            InboundPayload::Binary(bytes) => {
                let error = SessionError::DecodeAnomaly {
                    role,
                    len: bytes.len(),
                };
                self.log(&mut out, error.log_level(), error.to_string());
            }
        }
        out
    }

    fn on_notify_error(&mut self, characteristic: Uuid, error: String) -> Output {
        let mut out = Output::new();
        let role = match EndpointRole::from_uuid(&characteristic) {
            Some(role) => role.to_string(),
            None => characteristic.to_string(),
        };
        self.log(
            &mut out,
            LogLevel::Warn,
            format!("Notification error on {}: {}", role, error),
        );
        out
    }

    fn on_write_result(&mut self, characteristic: Uuid, result: std::result::Result<(), String>) -> Output {
        let mut out = Output::new();
        let Some(role) = self.bound_role(&characteristic) else {
            // Writes still in flight when the connection went away
            tracing::debug!("Ignoring write result for {} while {}", characteristic, self.state);
            return out;
        };

        match result {
            Ok(()) => tracing::debug!("Write to {} acknowledged", role),
            Err(reason) => {
                let error = SessionError::WriteFailed { role, reason };
                self.log(&mut out, error.log_level(), error.to_string());
            }
        }
        out
    }

    fn on_connection_lost(&mut self, peripheral: PeripheralId) -> Output {
        let mut out = Output::new();
        if !self.state.is_connected() || !self.is_target(&peripheral) {
            tracing::debug!("Ignoring link loss for {}", peripheral);
            return out;
        }

        self.teardown(&mut out);
        self.log(
            &mut out,
            LogLevel::Warn,
            format!("Connection to {} lost", peripheral),
        );
        out
    }

    // ------------------------------------------------------------------------
    // Internal Helpers
    // ------------------------------------------------------------------------

    fn transition(&mut self, out: &mut Output, to: SessionState) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        self.stats.state_transitions += 1;
        tracing::info!("Session {} → {}", from, to);
        out.emit(AppEvent::StateChanged { from, to });
    }

    /// Info and above become log entries for observers; debug detail stays in `tracing`
    fn log(&self, out: &mut Output, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry::new(self.clock.now(), level, message);
        // Info and above reach tracing through the runtime's log sinks
        if level > LogLevel::Debug {
            out.emit(AppEvent::Log(entry));
        } else {
            tracing::debug!("{}", entry.message);
        }
    }

    fn end_scan(&mut self, out: &mut Output) {
        self.timers.cancel(TimerKey::ScanTimeout);
        let deadline = self.clock.now() + self.config.visibility_window;
        self.timers.arm(TimerKey::VisibilityWindow, deadline);
        out.effect(Effect::StopScan);
        self.transition(out, SessionState::Idle);
    }

    fn clear_directory(&mut self, out: &mut Output) -> usize {
        let removed = self.directory.clear();
        if removed > 0 {
            out.emit(AppEvent::DirectoryCleared { removed });
        }
        removed
    }

    fn discovery_failed(&mut self, out: &mut Output, reason: String) {
        let error = SessionError::DiscoveryFailed { reason };
        if let Some(target) = &self.target {
            out.effect(Effect::Disconnect {
                peripheral: target.id.clone(),
            });
        }
        self.teardown(out);
        self.log(out, error.log_level(), error.to_string());
    }

    /// Forget everything tied to the connection and return to `Idle`
    fn teardown(&mut self, out: &mut Output) {
        self.endpoints.clear();
        self.reset_buffers();
        self.pending_transfer = None;
        self.timers.cancel_all();
        self.target = None;
        self.transition(out, SessionState::Idle);
    }

    fn reset_buffers(&mut self) {
        for buffer in self.buffers.values_mut() {
            buffer.reset(None);
        }
    }

    fn is_target(&self, peripheral: &PeripheralId) -> bool {
        self.target.as_ref().is_some_and(|target| &target.id == peripheral)
    }

    fn bound_role(&self, characteristic: &Uuid) -> Option<EndpointRole> {
        if self.state != SessionState::Ready {
            return None;
        }
        self.endpoints.role_of(characteristic)
    }
}
