//! Cancellable deadlines keyed by purpose
//!
//! The session never sleeps. It arms deadlines here and checks them whenever a
//! `Tick` arrives, so a cancelled timer can never fire late and tests control
//! time through the session's [`crate::TimeSource`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// What a deadline is for. Arming a key again replaces its previous deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimerKey {
    /// Scanning stops on its own after this
    ScanTimeout,
    /// Discovered peripherals are purged after this
    VisibilityWindow,
}

impl fmt::Display for TimerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerKey::ScanTimeout => write!(f, "scan timeout"),
            TimerKey::VisibilityWindow => write!(f, "visibility window"),
        }
    }
}

/// Armed deadlines
#[derive(Debug, Clone, Default)]
pub struct Timers {
    armed: HashMap<TimerKey, Timestamp>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, key: TimerKey, deadline: Timestamp) {
        tracing::debug!("Armed {} for {}", key, deadline);
        self.armed.insert(key, deadline);
    }

    /// Returns whether the timer was armed
    pub fn cancel(&mut self, key: TimerKey) -> bool {
        let was_armed = self.armed.remove(&key).is_some();
        if was_armed {
            tracing::debug!("Cancelled {}", key);
        }
        was_armed
    }

    pub fn cancel_all(&mut self) {
        if !self.armed.is_empty() {
            tracing::debug!("Cancelled {} timers", self.armed.len());
        }
        self.armed.clear();
    }

    pub fn is_armed(&self, key: TimerKey) -> bool {
        self.armed.contains_key(&key)
    }

    pub fn deadline(&self, key: TimerKey) -> Option<Timestamp> {
        self.armed.get(&key).copied()
    }

    /// Earliest armed deadline
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.armed.values().min().copied()
    }

    /// Disarm and return every timer due at `now`, earliest first
    pub fn take_due(&mut self, now: Timestamp) -> Vec<TimerKey> {
        let mut due: Vec<(Timestamp, TimerKey)> = self
            .armed
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, deadline)| (*deadline, *key))
            .collect();
        due.sort();

        for (_, key) in &due {
            self.armed.remove(key);
        }
        due.into_iter().map(|(_, key)| key).collect()
    }
}
