//! Error types for the btleplug central

use nodelink_core::TransportError;
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors raised while bringing up the BLE stack
#[derive(Error, Debug)]
pub enum BleError {
    #[error("Failed to create BLE manager: {0}")]
    Manager(#[source] btleplug::Error),

    #[error("Failed to get BLE adapters: {0}")]
    Adapters(#[source] btleplug::Error),

    #[error("BLE adapter {index} not available ({available} found)")]
    AdapterNotAvailable { index: usize, available: usize },

    #[error("Failed to get BLE events: {0}")]
    EventStream(#[source] btleplug::Error),
}

impl From<BleError> for TransportError {
    fn from(err: BleError) -> Self {
        match err {
            BleError::AdapterNotAvailable { .. } => TransportError::AdapterUnavailable,
            other => TransportError::ScanFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_adapter_maps_to_unavailable() {
        let err = BleError::AdapterNotAvailable {
            index: 1,
            available: 1,
        };
        assert_eq!(err.to_string(), "BLE adapter 1 not available (1 found)");
        assert_eq!(TransportError::from(err), TransportError::AdapterUnavailable);
    }
}
