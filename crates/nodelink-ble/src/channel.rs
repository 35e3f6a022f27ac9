//! GATT access to one connected node peripheral

use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _, ValueNotification, WriteType};
use btleplug::platform::Peripheral;
use futures::stream::{Stream, StreamExt};
use nodelink_core::{ConnectedChannel, NotificationStream, PeripheralId, TransportError};
use tracing::{debug, trace};
use uuid::Uuid;

/// [`ConnectedChannel`] over a connected btleplug peripheral
pub struct BtleplugChannel {
    id: PeripheralId,
    peripheral: Peripheral,
}

impl BtleplugChannel {
    pub(crate) fn new(id: PeripheralId, peripheral: Peripheral) -> Self {
        Self { id, peripheral }
    }

    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, TransportError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(TransportError::CharacteristicNotFound {
                characteristic: uuid,
            })
    }
}

pub(crate) fn write_type(require_ack: bool) -> WriteType {
    if require_ack {
        WriteType::WithResponse
    } else {
        WriteType::WithoutResponse
    }
}

/// The peripheral has one notification stream; keep only `characteristic`
pub(crate) fn values_of<S>(notifications: S, characteristic: Uuid) -> NotificationStream
where
    S: Stream<Item = ValueNotification> + Send + 'static,
{
    notifications
        .filter_map(move |notification| async move {
            (notification.uuid == characteristic).then_some(Ok(notification.value))
        })
        .boxed()
}

#[async_trait]
impl ConnectedChannel for BtleplugChannel {
    fn peripheral(&self) -> &PeripheralId {
        &self.id
    }

    async fn discover_services(&self) -> Result<Vec<Uuid>, TransportError> {
        self.peripheral
            .discover_services()
            .await
            .map_err(|e| TransportError::DiscoveryFailed(e.to_string()))?;
        let services: Vec<Uuid> = self.peripheral.services().iter().map(|s| s.uuid).collect();
        debug!("Discovered {} services on {}", services.len(), self.id);
        Ok(services)
    }

    async fn discover_characteristics(&self, service: Uuid) -> Result<Vec<Uuid>, TransportError> {
        // btleplug resolves characteristics together with services
        let services = self.peripheral.services();
        let found = services
            .iter()
            .find(|s| s.uuid == service)
            .ok_or(TransportError::ServiceNotFound { service })?;
        Ok(found.characteristics.iter().map(|c| c.uuid).collect())
    }

    async fn write(
        &self,
        characteristic: Uuid,
        payload: &[u8],
        require_ack: bool,
    ) -> Result<(), TransportError> {
        let target = self.characteristic(characteristic)?;
        self.peripheral
            .write(&target, payload, write_type(require_ack))
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        trace!("Wrote {} bytes to {}", payload.len(), characteristic);
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream, TransportError> {
        let target = self.characteristic(characteristic)?;

        // Listen before subscribing so the first values are not missed
        let notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;
        self.peripheral
            .subscribe(&target)
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;

        debug!("Subscribed to {} on {}", characteristic, self.id);
        Ok(values_of(notifications, characteristic))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.peripheral
            .disconnect()
            .await
            .map_err(|e| TransportError::ConnectFailed(format!("disconnect: {}", e)))?;
        debug!("Disconnected from {}", self.id);
        Ok(())
    }
}
