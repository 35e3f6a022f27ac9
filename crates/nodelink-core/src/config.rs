//! Session and log configuration

use std::time::Duration;

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Timing for the session state machine
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Scanning stops on its own after this long
    pub scan_timeout: Duration,
    /// How long discovered devices stay listed after scanning stops
    pub visibility_window: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(10),
            visibility_window: Duration::from_secs(30),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set scan timeout
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set device visibility window
    pub fn with_visibility_window(mut self, window: Duration) -> Self {
        self.visibility_window = window;
        self
    }
}

// ----------------------------------------------------------------------------
// Log Configuration
// ----------------------------------------------------------------------------

/// Retention for [`crate::log::BoundedLog`]
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Entries kept before trimming
    pub capacity: usize,
    /// Oldest entries dropped at once when the capacity is exceeded
    pub trim_block: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            trim_block: 100,
        }
    }
}
