//! btleplug central: scanning, connecting and link-loss reporting

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId as PlatformId};
use futures::stream::{BoxStream, StreamExt};
use nodelink_core::{
    BleCentral, ConnectedChannel, Discovery, PeripheralHandle, PeripheralId, RadioState,
    TransportError,
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::BtleplugChannel;
use crate::config::BleCentralConfig;
use crate::error::BleError;

type KnownPeripherals = Arc<RwLock<HashMap<PeripheralId, Peripheral>>>;

/// Stable identifier for a platform peripheral.
/// Uses the MAC address where the platform exposes one (not on macOS).
pub(crate) fn peripheral_key(address: [u8; 6], platform_id: &PlatformId) -> PeripheralId {
    if address != [0u8; 6] {
        let hex: Vec<String> = address.iter().map(|b| format!("{:02X}", b)).collect();
        return PeripheralId::new(hex.join(":"));
    }
    PeripheralId::new(format!("{:?}", platform_id))
}

fn key_of(peripheral: &Peripheral) -> PeripheralId {
    peripheral_key(peripheral.address().into_inner(), &peripheral.id())
}

pub(crate) fn radio_state_from(state: CentralState) -> RadioState {
    match state {
        CentralState::PoweredOn => RadioState::PoweredOn,
        CentralState::PoweredOff => RadioState::PoweredOff,
        _ => RadioState::Unknown,
    }
}

// ----------------------------------------------------------------------------
// Central
// ----------------------------------------------------------------------------

/// [`BleCentral`] over the platform adapter btleplug finds
pub struct BtleplugCentral {
    config: BleCentralConfig,
    adapter: Adapter,
    /// Peripherals seen while scanning, by the id handed to the session
    known: KnownPeripherals,
}

impl BtleplugCentral {
    /// Initialize BLE adapter
    pub async fn new(config: BleCentralConfig) -> Result<Self, BleError> {
        let manager = Manager::new().await.map_err(BleError::Manager)?;
        let adapters = manager.adapters().await.map_err(BleError::Adapters)?;
        let available = adapters.len();
        let adapter = adapters
            .into_iter()
            .nth(config.adapter_index)
            .ok_or(BleError::AdapterNotAvailable {
                index: config.adapter_index,
                available,
            })?;

        match adapter.adapter_info().await {
            Ok(info) => info!("BLE adapter initialized: {}", info),
            Err(e) => info!("BLE adapter initialized (no adapter info: {})", e),
        }

        Ok(Self {
            config,
            adapter,
            known: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Find a peripheral by session id among scanned and adapter-known peripherals
    async fn lookup(&self, id: &PeripheralId) -> Result<Peripheral, TransportError> {
        if let Some(peripheral) = self.known.read().await.get(id) {
            return Ok(peripheral.clone());
        }

        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let found = peripherals.into_iter().find(|p| &key_of(p) == id);
        match found {
            Some(peripheral) => {
                self.known
                    .write()
                    .await
                    .insert(id.clone(), peripheral.clone());
                Ok(peripheral)
            }
            None => Err(TransportError::PeripheralNotFound {
                peripheral: id.clone(),
            }),
        }
    }
}

/// Turn an advertisement event into a sighting of a node peripheral
async fn describe(
    adapter: &Adapter,
    platform_id: &PlatformId,
    service: Uuid,
    require_service: bool,
    known: &KnownPeripherals,
) -> Option<Discovery> {
    let peripheral = adapter.peripheral(platform_id).await.ok()?;
    let properties = match peripheral.properties().await {
        Ok(Some(properties)) => properties,
        Ok(None) => return None,
        Err(e) => {
            debug!("No properties for {:?}: {}", platform_id, e);
            return None;
        }
    };
    if require_service && !properties.services.contains(&service) {
        return None;
    }

    let id = key_of(&peripheral);
    known.write().await.insert(id.clone(), peripheral);
    Some(Discovery {
        handle: PeripheralHandle::new(id, properties.local_name),
        rssi: properties.rssi,
    })
}

#[async_trait]
impl BleCentral for BtleplugCentral {
    async fn radio_state(&self) -> RadioState {
        match self.adapter.adapter_state().await {
            Ok(state) => radio_state_from(state),
            Err(e) => {
                warn!("Failed to read adapter state: {}", e);
                RadioState::Unknown
            }
        }
    }

    async fn scan(&self, service: Uuid) -> Result<BoxStream<'static, Discovery>, TransportError> {
        let events = self
            .adapter
            .events()
            .await
            .map_err(|e| TransportError::from(BleError::EventStream(e)))?;

        self.adapter
            .start_scan(ScanFilter {
                services: vec![service],
            })
            .await
            .map_err(|e| TransportError::ScanFailed(e.to_string()))?;
        info!("Started BLE scanning for service {}", service);

        let adapter = self.adapter.clone();
        let known = Arc::clone(&self.known);
        let require_service = self.config.require_service_advertisement;
        let discoveries = events.filter_map(move |event| {
            let adapter = adapter.clone();
            let known = Arc::clone(&known);
            async move {
                match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        describe(&adapter, &id, service, require_service, &known).await
                    }
                    CentralEvent::ServicesAdvertisement { id, services }
                        if services.contains(&service) =>
                    {
                        describe(&adapter, &id, service, false, &known).await
                    }
                    _ => None,
                }
            }
        });
        Ok(discoveries.boxed())
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.adapter
            .stop_scan()
            .await
            .map_err(|e| TransportError::ScanFailed(format!("stop: {}", e)))?;
        debug!("Stopped BLE scanning");
        Ok(())
    }

    async fn connect(
        &self,
        handle: &PeripheralHandle,
    ) -> Result<Arc<dyn ConnectedChannel>, TransportError> {
        let peripheral = self.lookup(&handle.id).await?;
        let already = peripheral.is_connected().await.unwrap_or(false);
        if !already {
            peripheral
                .connect()
                .await
                .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        }
        info!("Connected to peripheral: {}", handle);
        Ok(Arc::new(BtleplugChannel::new(handle.id.clone(), peripheral)))
    }

    async fn disconnections(&self) -> Result<BoxStream<'static, PeripheralId>, TransportError> {
        let events = self
            .adapter
            .events()
            .await
            .map_err(|e| TransportError::from(BleError::EventStream(e)))?;
        let adapter = self.adapter.clone();
        let lost = events.filter_map(move |event| {
            let adapter = adapter.clone();
            async move {
                match event {
                    CentralEvent::DeviceDisconnected(id) => match adapter.peripheral(&id).await {
                        Ok(peripheral) => Some(key_of(&peripheral)),
                        Err(e) => {
                            debug!("Disconnect from unknown peripheral {:?}: {}", id, e);
                            None
                        }
                    },
                    _ => None,
                }
            }
        });
        Ok(lost.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radio_state_mapping() {
        assert_eq!(radio_state_from(CentralState::PoweredOn), RadioState::PoweredOn);
        assert_eq!(radio_state_from(CentralState::PoweredOff), RadioState::PoweredOff);
        assert_eq!(radio_state_from(CentralState::Unknown), RadioState::Unknown);
    }
}
