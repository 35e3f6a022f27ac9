//! Bluetooth Low Energy central for the node session
//!
//! This crate implements the `BleCentral` and `ConnectedChannel` traits from
//! `nodelink-core` on top of btleplug, so the session runtime can drive a real
//! adapter.
//!
//! ## Architecture
//!
//! - [`config`] - Adapter selection and advertisement filtering
//! - [`error`] - Errors raised while bringing up the BLE stack
//! - [`central`] - Scanning, connecting and link-loss reporting
//! - [`channel`] - Service discovery, writes and notifications on one peripheral
//!
//! ## Usage
//!
//! ```rust,no_run
//! use nodelink_ble::{BleCentralConfig, BtleplugCentral};
//! use nodelink_runtime::RuntimeBuilder;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let central = BtleplugCentral::new(BleCentralConfig::new()).await?;
//! let mut runtime = RuntimeBuilder::new(central).build_and_start()?;
//! runtime.start_scan().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Support
//!
//! Linux (BlueZ), macOS (Core Bluetooth) and Windows, as far as btleplug
//! supports central mode there. On macOS peripherals have no visible address,
//! so their ids are platform UUIDs instead of MAC addresses.

mod central;
mod channel;
mod config;
mod error;

pub use central::BtleplugCentral;
pub use channel::BtleplugChannel;
pub use config::BleCentralConfig;
pub use error::BleError;

// Re-export transport traits for convenience
pub use nodelink_core::transport::{BleCentral, ConnectedChannel};
