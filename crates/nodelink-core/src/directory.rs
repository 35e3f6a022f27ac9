//! Discovered peripherals
//!
//! The directory holds every peripheral seen during the current scan session.
//! Entries keep the position of their first sighting while name and signal
//! strength follow the latest one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{PeripheralHandle, PeripheralId, Timestamp};

// ----------------------------------------------------------------------------
// Directory Entries
// ----------------------------------------------------------------------------

/// A discovered peripheral
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub handle: PeripheralHandle,
    pub rssi: Option<i16>,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
}

/// Outcome of recording a sighting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sighting {
    New,
    Updated,
}

// ----------------------------------------------------------------------------
// Device Directory
// ----------------------------------------------------------------------------

/// Deduplicated, insertion-ordered set of discovered peripherals
#[derive(Debug, Clone, Default)]
pub struct DeviceDirectory {
    entries: Vec<DirectoryEntry>,
    index: HashMap<PeripheralId, usize>,
}

impl DeviceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sighting of `handle`
    pub fn record(&mut self, handle: PeripheralHandle, rssi: Option<i16>, now: Timestamp) -> Sighting {
        if let Some(&position) = self.index.get(&handle.id) {
            let entry = &mut self.entries[position];
            // An advertisement without a name does not erase a name seen earlier
            if handle.name.is_some() {
                entry.handle.name = handle.name;
            }
            if rssi.is_some() {
                entry.rssi = rssi;
            }
            entry.last_seen = now;
            return Sighting::Updated;
        }

        self.index.insert(handle.id.clone(), self.entries.len());
        self.entries.push(DirectoryEntry {
            handle,
            rssi,
            first_seen: now,
            last_seen: now,
        });
        Sighting::New
    }

    pub fn get(&self, id: &PeripheralId) -> Option<&DirectoryEntry> {
        self.index.get(id).map(|&position| &self.entries[position])
    }

    /// Entry by display position
    pub fn get_index(&self, position: usize) -> Option<&DirectoryEntry> {
        self.entries.get(position)
    }

    pub fn contains(&self, id: &PeripheralId) -> bool {
        self.index.contains_key(id)
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.index.clear();
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: &str, name: Option<&str>) -> PeripheralHandle {
        PeripheralHandle::new(id, name.map(str::to_string))
    }

    #[test]
    fn test_dedup_keeps_first_position() {
        let mut directory = DeviceDirectory::new();
        assert_eq!(
            directory.record(handle("A", Some("Node-A")), Some(-70), Timestamp::new(1)),
            Sighting::New
        );
        directory.record(handle("B", None), Some(-60), Timestamp::new(2));
        assert_eq!(
            directory.record(handle("A", Some("Node-A2")), Some(-40), Timestamp::new(3)),
            Sighting::Updated
        );

        assert_eq!(directory.len(), 2);
        let first = directory.get_index(0).unwrap();
        assert_eq!(first.handle.id, PeripheralId::new("A"));
        assert_eq!(first.handle.name.as_deref(), Some("Node-A2"));
        assert_eq!(first.rssi, Some(-40));
        assert_eq!(first.first_seen, Timestamp::new(1));
        assert_eq!(first.last_seen, Timestamp::new(3));
    }

    #[test]
    fn test_anonymous_sighting_keeps_name() {
        let mut directory = DeviceDirectory::new();
        directory.record(handle("A", Some("Node-A")), None, Timestamp::new(1));
        directory.record(handle("A", None), Some(-50), Timestamp::new(2));

        let entry = directory.get(&PeripheralId::new("A")).unwrap();
        assert_eq!(entry.handle.name.as_deref(), Some("Node-A"));
        assert_eq!(entry.rssi, Some(-50));
    }

    #[test]
    fn test_clear() {
        let mut directory = DeviceDirectory::new();
        directory.record(handle("A", None), None, Timestamp::new(1));
        directory.record(handle("B", None), None, Timestamp::new(1));

        assert_eq!(directory.clear(), 2);
        assert!(directory.is_empty());
        assert!(!directory.contains(&PeripheralId::new("A")));
        assert_eq!(
            directory.record(handle("A", None), None, Timestamp::new(2)),
            Sighting::New
        );
    }
}
