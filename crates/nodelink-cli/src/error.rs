//! Error handling for the Nodelink CLI

use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] nodelink_runtime::RuntimeError),

    #[error("BLE initialization failed: {0}")]
    Ble(#[from] nodelink_ble::BleError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Runtime stopped unexpectedly")]
    EventStreamClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
