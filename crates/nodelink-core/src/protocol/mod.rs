//! Node BLE protocol: identifiers, endpoint roles and payload handling
//!
//! - [`command`] - Outbound command envelopes and their wire encoding
//! - [`codec`] - Inbound payload classification and filename listings
//! - [`transfer`] - Reassembly buffer for binary file transfers

pub mod codec;
pub mod command;
pub mod transfer;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use codec::{decode, hex_projection, FilenameListing, InboundPayload};
pub use command::{CommandEnvelope, OutboundWrite};
pub use transfer::FileTransferBuffer;

// ----------------------------------------------------------------------------
// BLE Service and Characteristic UUIDs
// ----------------------------------------------------------------------------

/// Node service advertised by the remote device
pub const NODE_SERVICE_UUID: Uuid = Uuid::from_u128(0x57617368_5501_0001_8000_00805f9b34fb);

/// Filename requests and filename listings
pub const FILENAME_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x57617368_5502_0001_8000_00805f9b34fb);

/// Binary file content notifications
pub const FILE_TRANSFER_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x57617368_5503_0001_8000_00805f9b34fb);

/// JSON gateway commands
pub const GATEWAY_COMMAND_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x57617368_5504_0001_8000_00805f9b34fb);

/// Node characteristic
pub const NODE_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x57617368_5505_0001_8000_00805f9b34fb);

// ----------------------------------------------------------------------------
// Endpoint Roles
// ----------------------------------------------------------------------------

/// The four characteristics the client knows how to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EndpointRole {
    Filename,
    FileTransfer,
    GatewayCommand,
    Node,
}

impl EndpointRole {
    pub const ALL: [EndpointRole; 4] = [
        EndpointRole::Filename,
        EndpointRole::FileTransfer,
        EndpointRole::GatewayCommand,
        EndpointRole::Node,
    ];

    pub fn uuid(self) -> Uuid {
        match self {
            EndpointRole::Filename => FILENAME_CHARACTERISTIC_UUID,
            EndpointRole::FileTransfer => FILE_TRANSFER_CHARACTERISTIC_UUID,
            EndpointRole::GatewayCommand => GATEWAY_COMMAND_CHARACTERISTIC_UUID,
            EndpointRole::Node => NODE_CHARACTERISTIC_UUID,
        }
    }

    pub fn from_uuid(uuid: &Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.uuid() == *uuid)
    }

    /// Whether the session subscribes to notifications on this endpoint
    pub fn notifies(self) -> bool {
        matches!(self, EndpointRole::Filename | EndpointRole::FileTransfer)
    }
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointRole::Filename => write!(f, "filename"),
            EndpointRole::FileTransfer => write!(f, "file-transfer"),
            EndpointRole::GatewayCommand => write!(f, "gateway-command"),
            EndpointRole::Node => write!(f, "node"),
        }
    }
}

// ----------------------------------------------------------------------------
// Resolved Endpoints
// ----------------------------------------------------------------------------

/// Characteristic bindings resolved during discovery, one optional slot per role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSet {
    filename: Option<Uuid>,
    file_transfer: Option<Uuid>,
    gateway_command: Option<Uuid>,
    node: Option<Uuid>,
}

impl EndpointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every known characteristic in `characteristics`, ignoring the rest
    pub fn from_characteristics<'a>(characteristics: impl IntoIterator<Item = &'a Uuid>) -> Self {
        let mut set = Self::new();
        for uuid in characteristics {
            set.bind(*uuid);
        }
        set
    }

    /// Bind a discovered characteristic to its slot. Returns `None` for unknown UUIDs.
    pub fn bind(&mut self, uuid: Uuid) -> Option<EndpointRole> {
        let role = EndpointRole::from_uuid(&uuid)?;
        *self.slot_mut(role) = Some(uuid);
        Some(role)
    }

    pub fn get(&self, role: EndpointRole) -> Option<Uuid> {
        match role {
            EndpointRole::Filename => self.filename,
            EndpointRole::FileTransfer => self.file_transfer,
            EndpointRole::GatewayCommand => self.gateway_command,
            EndpointRole::Node => self.node,
        }
    }

    pub fn is_bound(&self, role: EndpointRole) -> bool {
        self.get(role).is_some()
    }

    /// Role of a bound characteristic
    pub fn role_of(&self, uuid: &Uuid) -> Option<EndpointRole> {
        EndpointRole::from_uuid(uuid).filter(|role| self.get(*role) == Some(*uuid))
    }

    /// Roles that currently have a binding, in declaration order
    pub fn bound_roles(&self) -> impl Iterator<Item = EndpointRole> + '_ {
        EndpointRole::ALL
            .into_iter()
            .filter(move |role| self.is_bound(*role))
    }

    pub fn len(&self) -> usize {
        self.bound_roles().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn slot_mut(&mut self, role: EndpointRole) -> &mut Option<Uuid> {
        match role {
            EndpointRole::Filename => &mut self.filename,
            EndpointRole::FileTransfer => &mut self.file_transfer,
            EndpointRole::GatewayCommand => &mut self.gateway_command,
            EndpointRole::Node => &mut self.node,
        }
    }
}
