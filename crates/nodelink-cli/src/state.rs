//! Client-side view of the session, rebuilt from app events

use std::path::Path;

use nodelink_core::{
    AppEvent, BoundedLog, DeviceDirectory, DirectoryEntry, EventLogSink, LogConfig, PeripheralId,
    SessionState, Timestamp,
};

use crate::error::{CliError, Result};

/// A transfer the user declared finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFile {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
    pub hex: String,
}

impl CompletedFile {
    /// Write the raw file bytes to `path`
    pub fn save(&self, path: &Path) -> Result<usize> {
        std::fs::write(path, &self.bytes)?;
        Ok(self.bytes.len())
    }
}

/// What the CLI knows about the session
#[derive(Debug, Clone)]
pub struct ClientState {
    pub session_state: SessionState,
    pub directory: DeviceDirectory,
    pub log: BoundedLog,
    /// Last filename listing from the node
    pub filenames: Vec<String>,
    /// File currently being received and its byte count
    pub transfer: Option<(String, usize)>,
    pub last_file: Option<CompletedFile>,
}

impl ClientState {
    pub fn new(log_config: &LogConfig) -> Self {
        Self {
            session_state: SessionState::Idle,
            directory: DeviceDirectory::new(),
            log: BoundedLog::new(log_config),
            filenames: Vec::new(),
            transfer: None,
            last_file: None,
        }
    }

    /// Fold one app event into the state. Returns a line worth showing the user.
    pub fn apply(&mut self, event: &AppEvent) -> Option<String> {
        match event {
            AppEvent::StateChanged { to, .. } => {
                self.session_state = *to;
                Some(format!("state: {}", to))
            }
            AppEvent::Log(entry) => {
                self.log.record(entry);
                Some(format!("{} {}", entry.level, entry.message))
            }
            AppEvent::DeviceDiscovered { handle, rssi, new } => {
                self.directory.record(handle.clone(), *rssi, Timestamp::now());
                new.then(|| {
                    let position = self.directory.len();
                    format!("found [{}] {}", position, describe_device(handle.display_name(), &handle.id, *rssi))
                })
            }
            AppEvent::DirectoryCleared { removed } => {
                self.directory.clear();
                (*removed > 0).then(|| format!("cleared {} devices", removed))
            }
            AppEvent::TextReceived { role, text } => Some(format!("{}: {}", role, text)),
            AppEvent::FilenamesReceived { filenames, .. } => {
                self.filenames = filenames.clone();
                Some(format!("files: {}", filenames.join(", ")))
            }
            AppEvent::FileBytesAppended { total_len, .. } => {
                if let Some((_, received)) = self.transfer.as_mut() {
                    *received = *total_len;
                }
                None
            }
            AppEvent::TransferStarted { filename } => {
                self.transfer = Some((filename.clone(), 0));
                Some(format!("receiving {}", filename))
            }
            AppEvent::TransferFinished {
                filename,
                bytes,
                hex,
            } => {
                self.transfer = None;
                let line = format!(
                    "received {} ({} bytes)",
                    filename.as_deref().unwrap_or("unnamed file"),
                    bytes.len()
                );
                self.last_file = Some(CompletedFile {
                    filename: filename.clone(),
                    bytes: bytes.clone(),
                    hex: hex.clone(),
                });
                Some(line)
            }
        }
    }

    /// Resolve a 1-based directory position or a peripheral id
    pub fn resolve_device(&self, target: &str) -> Result<PeripheralId> {
        if let Ok(position) = target.parse::<usize>() {
            return position
                .checked_sub(1)
                .and_then(|index| self.directory.get_index(index))
                .map(|entry| entry.handle.id.clone())
                .ok_or_else(|| {
                    CliError::InvalidArgument(format!(
                        "No device at position {} ({} listed)",
                        position,
                        self.directory.len()
                    ))
                });
        }
        Ok(PeripheralId::new(target))
    }

    /// Directory listing, one numbered line per device
    pub fn render_directory(&self) -> String {
        if self.directory.is_empty() {
            return "No devices discovered".to_string();
        }
        self.directory
            .iter()
            .enumerate()
            .map(|(index, entry)| format!("[{}] {}", index + 1, describe_entry(entry)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn render_status(&self) -> String {
        let mut lines = vec![
            format!("Session: {}", self.session_state),
            format!("Devices: {}", self.directory.len()),
            format!("Log entries: {}", self.log.len()),
        ];
        if !self.filenames.is_empty() {
            lines.push(format!("Files: {}", self.filenames.join(", ")));
        }
        if let Some((filename, received)) = &self.transfer {
            lines.push(format!("Receiving: {} ({} bytes so far)", filename, received));
        }
        if let Some(file) = &self.last_file {
            lines.push(format!(
                "Last file: {} ({} bytes)",
                file.filename.as_deref().unwrap_or("unnamed"),
                file.bytes.len()
            ));
        }
        lines.join("\n")
    }
}

pub fn describe_entry(entry: &DirectoryEntry) -> String {
    describe_device(entry.handle.display_name(), &entry.handle.id, entry.rssi)
}

fn describe_device(name: &str, id: &PeripheralId, rssi: Option<i16>) -> String {
    match rssi {
        Some(rssi) => format!("{} ({}) {} dBm", name, id, rssi),
        None => format!("{} ({})", name, id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodelink_core::{EndpointRole, LogEntry, LogLevel, PeripheralHandle};

    fn discovered(id: &str, name: Option<&str>, rssi: Option<i16>, new: bool) -> AppEvent {
        AppEvent::DeviceDiscovered {
            handle: PeripheralHandle::new(id, name.map(str::to_string)),
            rssi,
            new,
        }
    }

    #[test]
    fn test_directory_mirrors_discoveries() {
        let mut state = ClientState::new(&LogConfig::default());

        let line = state.apply(&discovered("n1", Some("Node One"), Some(-50), true));
        assert_eq!(line.as_deref(), Some("found [1] Node One (n1) -50 dBm"));
        assert_eq!(state.apply(&discovered("n1", Some("Node One"), Some(-42), false)), None);
        state.apply(&discovered("n2", None, None, true));

        assert_eq!(state.directory.len(), 2);
        assert_eq!(state.resolve_device("2").unwrap(), PeripheralId::new("n2"));
        assert_eq!(state.directory.get_index(0).unwrap().rssi, Some(-42));

        state.apply(&AppEvent::DirectoryCleared { removed: 2 });
        assert!(state.directory.is_empty());
    }

    #[test]
    fn test_resolve_device() {
        let state = ClientState::new(&LogConfig::default());
        assert!(matches!(state.resolve_device("1"), Err(CliError::InvalidArgument(_))));
        assert!(matches!(state.resolve_device("0"), Err(CliError::InvalidArgument(_))));
        assert_eq!(state.resolve_device("AA:BB").unwrap(), PeripheralId::new("AA:BB"));
    }

    #[test]
    fn test_transfer_lifecycle() {
        let mut state = ClientState::new(&LogConfig::default());
        state.apply(&AppEvent::TransferStarted {
            filename: "b.txt".to_string(),
        });
        state.apply(&AppEvent::FileBytesAppended {
            role: EndpointRole::FileTransfer,
            chunk_hex: "DEAD".to_string(),
            total_len: 2,
        });
        assert_eq!(state.transfer, Some(("b.txt".to_string(), 2)));

        let line = state.apply(&AppEvent::TransferFinished {
            filename: Some("b.txt".to_string()),
            bytes: vec![0xDE, 0xAD],
            hex: "DEAD".to_string(),
        });
        assert_eq!(line.as_deref(), Some("received b.txt (2 bytes)"));
        assert_eq!(state.transfer, None);
        assert_eq!(state.last_file.as_ref().unwrap().hex, "DEAD");
        assert!(state.render_status().contains("Last file: b.txt (2 bytes)"));
    }

    #[test]
    fn test_log_is_bounded() {
        let config = LogConfig {
            capacity: 3,
            trim_block: 2,
        };
        let mut state = ClientState::new(&config);
        for i in 0..4 {
            state.apply(&AppEvent::Log(LogEntry::new(
                Timestamp::new(i),
                LogLevel::Info,
                format!("entry {}", i),
            )));
        }
        assert_eq!(state.log.len(), 2);
        assert!(state.log.render().ends_with("entry 3"));
    }

    #[test]
    fn test_save_completed_file() {
        let file = CompletedFile {
            filename: Some("b.txt".to_string()),
            bytes: vec![0xDE, 0xAD, 0xBE, 0xEF, 0x01],
            hex: "DEADBEEF01".to_string(),
        };
        let path = std::env::temp_dir().join(format!("nodelink-state-{}.bin", std::process::id()));
        assert_eq!(file.save(&path).unwrap(), 5);
        let written = std::fs::read(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(written, file.bytes);
    }
}
