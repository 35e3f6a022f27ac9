//! BLE central configuration

use serde::{Deserialize, Serialize};

/// Which adapter to drive and how to treat advertisements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleCentralConfig {
    /// Position of the adapter in the platform's adapter list
    pub adapter_index: usize,
    /// Only report peripherals whose advertisement lists the scanned service.
    /// Some platforms ignore the scan filter, so this is checked again here.
    pub require_service_advertisement: bool,
}

impl Default for BleCentralConfig {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            require_service_advertisement: true,
        }
    }
}

impl BleCentralConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set adapter index
    pub fn with_adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }

    pub fn with_require_service_advertisement(mut self, required: bool) -> Self {
        self.require_service_advertisement = required;
        self
    }
}
