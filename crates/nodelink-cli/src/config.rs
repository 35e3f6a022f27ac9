//! Nodelink CLI Configuration Management
//!
//! Configuration is read from a TOML file: the path given with `--config`, or
//! `~/.nodelink/config.toml` when that exists. Missing sections and fields take
//! their defaults, and command line flags are applied on top before the result
//! is validated.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use nodelink_ble::BleCentralConfig;
use nodelink_core::{LogConfig, SessionConfig};
use nodelink_runtime::RuntimeConfig;

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the Nodelink CLI application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliAppConfig {
    /// Session timing
    pub session: SessionConfig,

    /// Driver queues and transport timeouts
    pub runtime: RuntimeConfig,

    /// Adapter selection
    pub ble: BleCentralConfig,

    /// In-memory event log retention
    pub log: LogConfig,

    /// CLI-specific configuration
    pub cli: CliConfig,
}

/// CLI-specific configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Prompt style for the interactive shell
    pub prompt: String,

    /// How long `exec` waits for the device to be found and ready (in seconds)
    pub ready_timeout_secs: u64,

    /// How long `exec` waits for a reply to a request (in milliseconds)
    pub response_timeout_ms: u64,

    /// Default idle period that ends a file download (in milliseconds)
    pub transfer_idle_ms: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            prompt: "nodelink> ".to_string(),
            ready_timeout_secs: 20,
            response_timeout_ms: 3000,
            transfer_idle_ms: 2000,
        }
    }
}

impl CliConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn transfer_idle(&self) -> Duration {
        Duration::from_millis(self.transfer_idle_ms)
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl CliAppConfig {
    /// Load from `path`, or from the default location if it exists, or use defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => match Self::default_config_path() {
                Some(default) if default.exists() => Self::load_from_file(default),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::FileSystem(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&content)
            .map_err(|e| ConfigError::Loading(format!("Failed to load from {}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Parse and validate TOML configuration text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: CliAppConfig =
            toml::from_str(content).map_err(|e| ConfigError::Loading(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command line overrides
    pub fn with_overrides(mut self, scan_timeout_secs: Option<u64>, adapter: Option<usize>) -> Self {
        if let Some(secs) = scan_timeout_secs {
            self.session.scan_timeout = Duration::from_secs(secs);
        }
        if let Some(index) = adapter {
            self.ble.adapter_index = index;
        }
        self
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".nodelink").join("config.toml"))
    }

    /// Save configuration to a specific file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::FileSystem(format!("Failed to create config directory: {}", e)))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), toml_string)
            .map_err(|e| ConfigError::FileSystem(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.scan_timeout.is_zero() {
            return Err(ConfigError::Validation("Scan timeout must be greater than 0".to_string()));
        }

        self.runtime
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        if self.log.capacity == 0 {
            return Err(ConfigError::Validation("Log capacity must be greater than 0".to_string()));
        }
        if self.log.trim_block == 0 || self.log.trim_block > self.log.capacity {
            return Err(ConfigError::Validation(format!(
                "Log trim block must be between 1 and {}",
                self.log.capacity
            )));
        }

        if self.cli.ready_timeout_secs == 0 {
            return Err(ConfigError::Validation("Ready timeout must be greater than 0".to_string()));
        }
        if self.cli.transfer_idle_ms == 0 {
            return Err(ConfigError::Validation("Transfer idle period must be greater than 0".to_string()));
        }

        Ok(())
    }

    /// Create example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&CliAppConfig::default())
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
