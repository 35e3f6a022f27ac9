//! Outbound command envelopes
//!
//! Gateway commands are small JSON object literals. Their spacing is part of
//! the wire contract with the node firmware, so they are formatted by hand
//! rather than through a serializer.

use serde::{Deserialize, Serialize};

use super::EndpointRole;
use crate::types::TimeSource;

/// Token written to the filename characteristic to ask for a notification
pub const FILENAME_NOTIFY_REQUEST: &str = "request";

// ----------------------------------------------------------------------------
// Command Envelope
// ----------------------------------------------------------------------------

/// A command the client can send to the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandEnvelope {
    /// Synchronize the node clock (seconds since the Unix epoch)
    SetTimestamp { epoch_seconds: u64 },
    /// Ask the node to publish its filename listing
    RequestFilenameList,
    /// Erase on-device memory
    ClearMemory,
    /// Switch the node operating mode
    SetOperatingMode { mode: i64 },
    /// Raw `request` token on the filename characteristic
    RequestFilenameNotify,
    /// Start streaming the named file over the file-transfer characteristic
    RequestFileTransfer { filename: String },
}

/// Encoded command ready to be written to a characteristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundWrite {
    pub role: EndpointRole,
    pub payload: Vec<u8>,
    pub require_ack: bool,
}

impl CommandEnvelope {
    /// Timestamp sync for the current time of `clock`
    pub fn set_timestamp_now(clock: &impl TimeSource) -> Self {
        CommandEnvelope::SetTimestamp {
            epoch_seconds: clock.now().as_secs(),
        }
    }

    /// Endpoint the command is written to
    pub fn role(&self) -> EndpointRole {
        match self {
            CommandEnvelope::SetTimestamp { .. }
            | CommandEnvelope::RequestFilenameList
            | CommandEnvelope::ClearMemory
            | CommandEnvelope::SetOperatingMode { .. } => EndpointRole::GatewayCommand,
            CommandEnvelope::RequestFilenameNotify | CommandEnvelope::RequestFileTransfer { .. } => {
                EndpointRole::Filename
            }
        }
    }

    /// Wire bytes for this command
    pub fn encode(&self) -> Vec<u8> {
        match self {
            CommandEnvelope::SetTimestamp { epoch_seconds } => {
                format!("{{\"timestamp\": {}}}", epoch_seconds).into_bytes()
            }
            CommandEnvelope::RequestFilenameList => b"{\"sendFilenames\": true}".to_vec(),
            CommandEnvelope::ClearMemory => b"{\"clearMemory\": true}".to_vec(),
            CommandEnvelope::SetOperatingMode { mode } => {
                format!("{{\"operatingMode\":{}}}", mode).into_bytes()
            }
            CommandEnvelope::RequestFilenameNotify => FILENAME_NOTIFY_REQUEST.as_bytes().to_vec(),
            CommandEnvelope::RequestFileTransfer { filename } => filename.as_bytes().to_vec(),
        }
    }

    /// Encode and pair with the target endpoint. Every command requires an acknowledged write.
    pub fn to_write(&self) -> OutboundWrite {
        OutboundWrite {
            role: self.role(),
            payload: self.encode(),
            require_ack: true,
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            CommandEnvelope::SetTimestamp { .. } => "SetTimestamp",
            CommandEnvelope::RequestFilenameList => "RequestFilenameList",
            CommandEnvelope::ClearMemory => "ClearMemory",
            CommandEnvelope::SetOperatingMode { .. } => "SetOperatingMode",
            CommandEnvelope::RequestFilenameNotify => "RequestFilenameNotify",
            CommandEnvelope::RequestFileTransfer { .. } => "RequestFileTransfer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;

    struct FixedClock(u64);

    impl TimeSource for FixedClock {
        fn now(&self) -> Timestamp {
            Timestamp::new(self.0)
        }
    }

    fn text(envelope: &CommandEnvelope) -> String {
        String::from_utf8(envelope.encode()).unwrap()
    }

    #[test]
    fn test_gateway_command_encoding() {
        assert_eq!(
            text(&CommandEnvelope::SetTimestamp {
                epoch_seconds: 1_700_000_000
            }),
            r#"{"timestamp": 1700000000}"#
        );
        assert_eq!(
            text(&CommandEnvelope::RequestFilenameList),
            r#"{"sendFilenames": true}"#
        );
        assert_eq!(text(&CommandEnvelope::ClearMemory), r#"{"clearMemory": true}"#);
        assert_eq!(
            text(&CommandEnvelope::SetOperatingMode { mode: 1 }),
            r#"{"operatingMode":1}"#
        );
        assert_eq!(
            text(&CommandEnvelope::SetOperatingMode { mode: -3 }),
            r#"{"operatingMode":-3}"#
        );
    }

    #[test]
    fn test_filename_endpoint_encoding() {
        assert_eq!(text(&CommandEnvelope::RequestFilenameNotify), "request");
        let transfer = CommandEnvelope::RequestFileTransfer {
            filename: "b.txt".to_string(),
        };
        assert_eq!(transfer.encode(), b"b.txt".to_vec());
        assert_eq!(transfer.role(), EndpointRole::Filename);
    }

    #[test]
    fn test_writes_require_ack() {
        let commands = [
            CommandEnvelope::SetTimestamp { epoch_seconds: 0 },
            CommandEnvelope::RequestFilenameList,
            CommandEnvelope::ClearMemory,
            CommandEnvelope::SetOperatingMode { mode: 2 },
            CommandEnvelope::RequestFilenameNotify,
            CommandEnvelope::RequestFileTransfer {
                filename: "x".to_string(),
            },
        ];
        for command in commands {
            assert!(command.to_write().require_ack, "{}", command.name());
        }
    }

    #[test]
    fn test_set_timestamp_uses_whole_seconds() {
        let clock = FixedClock(1_700_000_000_999);
        assert_eq!(
            CommandEnvelope::set_timestamp_now(&clock),
            CommandEnvelope::SetTimestamp {
                epoch_seconds: 1_700_000_000
            }
        );
    }
}
