//! Transport abstraction
//!
//! A [`BleCentral`] is the local radio acting as a GATT client; connecting it to
//! a peripheral yields a [`ConnectedChannel`]. Every call may fail on its own
//! schedule, and the session treats each failure as the end of that connection
//! rather than of the process.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::errors::TransportError;
use crate::protocol::EndpointSet;
use crate::types::{PeripheralHandle, PeripheralId, RadioState};

/// Sighting of a peripheral during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub handle: PeripheralHandle,
    pub rssi: Option<i16>,
}

/// Notification payloads from one characteristic
pub type NotificationStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

// ----------------------------------------------------------------------------
// Central
// ----------------------------------------------------------------------------

/// Local BLE radio in central role
#[async_trait]
pub trait BleCentral: Send + Sync {
    /// Current radio power state
    async fn radio_state(&self) -> RadioState;

    /// Start scanning for peripherals advertising `service`.
    /// The stream never ends on its own; drop it to stop consuming.
    async fn scan(&self, service: Uuid) -> Result<BoxStream<'static, Discovery>, TransportError>;

    /// Stop the radio-level scan
    async fn stop_scan(&self) -> Result<(), TransportError>;

    /// Connect to a peripheral
    async fn connect(
        &self,
        handle: &PeripheralHandle,
    ) -> Result<Arc<dyn ConnectedChannel>, TransportError>;

    /// Peripherals whose link dropped without a local request
    async fn disconnections(&self) -> Result<BoxStream<'static, PeripheralId>, TransportError>;
}

// ----------------------------------------------------------------------------
// Connected Channel
// ----------------------------------------------------------------------------

/// GATT access to one connected peripheral
#[async_trait]
pub trait ConnectedChannel: Send + Sync {
    fn peripheral(&self) -> &PeripheralId;

    /// UUIDs of the services the peripheral exposes
    async fn discover_services(&self) -> Result<Vec<Uuid>, TransportError>;

    /// UUIDs of the characteristics within `service`
    async fn discover_characteristics(&self, service: Uuid) -> Result<Vec<Uuid>, TransportError>;

    /// Service and characteristic discovery in one step, bound to endpoint roles
    async fn discover_endpoints(&self, service: Uuid) -> Result<EndpointSet, TransportError> {
        let services = self.discover_services().await?;
        if !services.contains(&service) {
            return Err(TransportError::ServiceNotFound { service });
        }
        let characteristics = self.discover_characteristics(service).await?;
        Ok(EndpointSet::from_characteristics(&characteristics))
    }

    /// Write `payload` to a characteristic, optionally waiting for the acknowledgment
    async fn write(
        &self,
        characteristic: Uuid,
        payload: &[u8],
        require_ack: bool,
    ) -> Result<(), TransportError>;

    /// Subscribe to notifications. One active subscription per characteristic.
    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream, TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}
