//! Runtime error types

use thiserror::Error;

/// Failures of the runtime itself. Session-level problems are log entries, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("Invalid runtime configuration: {reason}")]
    Configuration { reason: String },

    #[error("Channel closed: {channel}")]
    ChannelClosed { channel: &'static str },

    #[error("Runtime is not running")]
    Stopped,

    #[error("Runtime task failed: {0}")]
    TaskFailed(String),
}
