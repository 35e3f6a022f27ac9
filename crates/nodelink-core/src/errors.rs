//! Error types for the node session core
//!
//! [`SessionError`] covers every condition the session reports to the event
//! log. None of them are fatal: the session always settles in a defined state
//! after returning one. [`TransportError`] is what a [`crate::transport`]
//! implementation hands back when the radio side fails.

use thiserror::Error;
use uuid::Uuid;

use crate::log::LogLevel;
use crate::protocol::EndpointRole;
use crate::session::SessionState;
use crate::types::{PeripheralId, RadioState};

// ----------------------------------------------------------------------------
// Session Errors
// ----------------------------------------------------------------------------

/// Conditions surfaced by the session state machine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Bluetooth radio not ready ({state})")]
    RadioUnavailable { state: RadioState },

    #[error("Scan failed: {reason}")]
    ScanFailed { reason: String },

    #[error("Failed to connect to {peripheral}: {reason}")]
    ConnectFailed {
        peripheral: PeripheralId,
        reason: String,
    },

    #[error("Service discovery failed: {reason}")]
    DiscoveryFailed { reason: String },

    #[error("Characteristic not available: {role}")]
    EndpointUnavailable { role: EndpointRole },

    #[error("Write to {role} characteristic failed: {reason}")]
    WriteFailed { role: EndpointRole, reason: String },

    #[error("Undecodable {len}-byte payload on {role} characteristic")]
    DecodeAnomaly { role: EndpointRole, len: usize },

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}

impl SessionError {
    /// Severity used when the error is written to the event log
    pub fn log_level(&self) -> LogLevel {
        match self {
            SessionError::RadioUnavailable { .. }
            | SessionError::ScanFailed { .. }
            | SessionError::EndpointUnavailable { .. }
            | SessionError::DecodeAnomaly { .. }
            | SessionError::InvalidState { .. } => LogLevel::Warn,
            SessionError::ConnectFailed { .. }
            | SessionError::DiscoveryFailed { .. }
            | SessionError::WriteFailed { .. } => LogLevel::Error,
        }
    }
}

/// Result type for session operations
pub type Result<T> = core::result::Result<T, SessionError>;

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

/// Failures reported by a BLE transport implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("BLE adapter not available")]
    AdapterUnavailable,

    #[error("Failed to scan: {0}")]
    ScanFailed(String),

    #[error("Peripheral not found: {peripheral}")]
    PeripheralNotFound { peripheral: PeripheralId },

    #[error("Failed to connect: {0}")]
    ConnectFailed(String),

    #[error("Failed to discover services: {0}")]
    DiscoveryFailed(String),

    #[error("Service not found: {service}")]
    ServiceNotFound { service: Uuid },

    #[error("Characteristic not found: {characteristic}")]
    CharacteristicNotFound { characteristic: Uuid },

    #[error("Failed to write to characteristic: {0}")]
    WriteFailed(String),

    #[error("Failed to subscribe to notifications: {0}")]
    SubscribeFailed(String),

    #[error("Notification stream failed: {0}")]
    NotifyFailed(String),

    #[error("Peripheral disconnected")]
    Disconnected,
}
