//! Runtime configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// Queue sizes and transport timeouts for the session driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Commands buffered between the handle and the driver
    pub command_buffer_size: usize,
    /// Transport results buffered for the driver
    pub event_buffer_size: usize,
    /// App events buffered for the observer
    pub app_event_buffer_size: usize,
    /// Connection attempts give up after this long
    pub connect_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 64,
            event_buffer_size: 256,
            app_event_buffer_size: 256,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl RuntimeConfig {
    /// Small buffers and a short connect timeout
    pub fn testing() -> Self {
        Self {
            command_buffer_size: 8,
            event_buffer_size: 32,
            app_event_buffer_size: 128,
            connect_timeout: Duration::from_secs(1),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), RuntimeError> {
        let buffers = [
            ("command_buffer_size", self.command_buffer_size),
            ("event_buffer_size", self.event_buffer_size),
            ("app_event_buffer_size", self.app_event_buffer_size),
        ];
        for (name, size) in buffers {
            if size == 0 {
                return Err(RuntimeError::Configuration {
                    reason: format!("{} must be greater than zero", name),
                });
            }
        }
        if self.connect_timeout.is_zero() {
            return Err(RuntimeError::Configuration {
                reason: "connect_timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
