//! Session Communication Protocol Types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::log::LogEntry;
use crate::protocol::{CommandEnvelope, EndpointRole};
use crate::session::SessionState;
use crate::types::{PeripheralHandle, PeripheralId, RadioState};

// ----------------------------------------------------------------------------
// Command: UI/External → Session
// ----------------------------------------------------------------------------

/// Requests from the UI or any other controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Scan for node peripherals
    StartScan,
    /// Stop an in-flight scan
    StopScan,
    /// Connect to a peripheral, stopping any scan first
    Connect { peripheral: PeripheralId },
    /// Tear down the current connection
    Disconnect,
    /// Write a command to the node
    Send { envelope: CommandEnvelope },
    /// Declare the current file transfer complete
    FinishTransfer,
}

// ----------------------------------------------------------------------------
// Event: Transport → Session
// ----------------------------------------------------------------------------

/// Ingress events, consumed one at a time by the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Time moved on; due timers fire
    Tick,
    /// Local radio power changed
    RadioStateChanged { state: RadioState },
    /// The radio refused to start scanning
    ScanFailed { reason: String },
    /// A peripheral advertising the node service was seen
    PeripheralDiscovered {
        handle: PeripheralHandle,
        rssi: Option<i16>,
    },
    /// Outcome of a connection attempt
    ConnectResult {
        peripheral: PeripheralId,
        result: Result<(), String>,
    },
    /// Services exposed by the connected peripheral
    ServiceList { result: Result<Vec<Uuid>, String> },
    /// Characteristics of the node service
    CharacteristicList { result: Result<Vec<Uuid>, String> },
    /// Notification payload from a subscribed characteristic
    NotifyValue { characteristic: Uuid, value: Vec<u8> },
    /// Notification stream failure
    NotifyError { characteristic: Uuid, error: String },
    /// Outcome of a characteristic write
    WriteResult {
        characteristic: Uuid,
        result: Result<(), String>,
    },
    /// The remote side dropped the link
    ConnectionLost { peripheral: PeripheralId },
}

// ----------------------------------------------------------------------------
// Effect: Session → Transport
// ----------------------------------------------------------------------------

/// Side effects for the transport driver. Results come back as [`Event`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    StartScan { service: Uuid },
    StopScan,
    Connect { handle: PeripheralHandle },
    DiscoverServices,
    DiscoverCharacteristics { service: Uuid },
    Subscribe { characteristic: Uuid },
    Write {
        characteristic: Uuid,
        payload: Vec<u8>,
        require_ack: bool,
    },
    Disconnect { peripheral: PeripheralId },
}

// ----------------------------------------------------------------------------
// AppEvent: Session → UI (State Changes Only)
// ----------------------------------------------------------------------------

/// Observable session changes, delivered in order on a single channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppEvent {
    /// Session moved between states
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// Human-readable log entry
    Log(LogEntry),
    /// Peripheral added to or refreshed in the directory
    DeviceDiscovered {
        handle: PeripheralHandle,
        rssi: Option<i16>,
        new: bool,
    },
    /// Directory emptied by a new scan or an expired visibility window
    DirectoryCleared { removed: usize },
    /// Text notification
    TextReceived { role: EndpointRole, text: String },
    /// Filename listing parsed from a text notification
    FilenamesReceived {
        filenames: Vec<String>,
        first: Option<String>,
    },
    /// Binary chunk appended to a transfer buffer
    FileBytesAppended {
        role: EndpointRole,
        chunk_hex: String,
        total_len: usize,
    },
    /// Transfer buffer reset for a new file
    TransferStarted { filename: String },
    /// Caller declared the transfer complete
    TransferFinished {
        filename: Option<String>,
        bytes: Vec<u8>,
        hex: String,
    },
}

impl AppEvent {
    /// Variant name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            AppEvent::StateChanged { .. } => "StateChanged",
            AppEvent::Log(_) => "Log",
            AppEvent::DeviceDiscovered { .. } => "DeviceDiscovered",
            AppEvent::DirectoryCleared { .. } => "DirectoryCleared",
            AppEvent::TextReceived { .. } => "TextReceived",
            AppEvent::FilenamesReceived { .. } => "FilenamesReceived",
            AppEvent::FileBytesAppended { .. } => "FileBytesAppended",
            AppEvent::TransferStarted { .. } => "TransferStarted",
            AppEvent::TransferFinished { .. } => "TransferFinished",
        }
    }
}
