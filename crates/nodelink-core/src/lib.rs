//! Nodelink Core
//!
//! Transport-agnostic session and protocol logic for talking to a node device
//! over Bluetooth Low Energy. Nothing in this crate touches a radio: the
//! [`Session`] consumes [`Event`]s and [`Command`]s one at a time and answers
//! with [`Effect`]s for the transport and [`AppEvent`]s for observers.
//!
//! ## Architecture
//!
//! - [`transport`] - Capability traits implemented by a concrete BLE stack
//! - [`protocol`] - UUIDs, command encoding, payload decoding, transfer buffers
//! - [`session`] - Connection state machine and request orchestration
//! - [`directory`] - Discovered peripherals with a visibility window
//! - [`timers`] - Cancellable deadlines keyed by purpose
//! - [`log`] - Event log entries and sinks
//! - [`channel`] - Typed messages flowing in and out of the session

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod config;
pub mod directory;
pub mod errors;
pub mod log;
pub mod protocol;
pub mod session;
pub mod timers;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use channel::{AppEvent, Command, Effect, Event};
pub use config::{LogConfig, SessionConfig};
pub use directory::{DeviceDirectory, DirectoryEntry, Sighting};
pub use errors::{Result, SessionError, TransportError};
pub use log::{BoundedLog, EventLogSink, LogEntry, LogLevel, TracingSink};
pub use protocol::{
    CommandEnvelope, EndpointRole, EndpointSet, FileTransferBuffer, FilenameListing,
    InboundPayload, OutboundWrite, FILENAME_CHARACTERISTIC_UUID, FILE_TRANSFER_CHARACTERISTIC_UUID,
    GATEWAY_COMMAND_CHARACTERISTIC_UUID, NODE_CHARACTERISTIC_UUID, NODE_SERVICE_UUID,
};
pub use session::{Output, Session, SessionState, SessionStats};
pub use timers::{TimerKey, Timers};
pub use transport::{BleCentral, ConnectedChannel, Discovery, NotificationStream};
pub use types::{
    PeripheralHandle, PeripheralId, RadioState, SystemTimeSource, TimeSource, Timestamp,
};
