//! Event log entries and sinks
//!
//! The session describes what it does as human-readable [`LogEntry`] values.
//! Where they end up is the sink owner's business: [`BoundedLog`] keeps a
//! capped in-memory history for a terminal view, [`TracingSink`] forwards to
//! `tracing`.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::LogConfig;
use crate::types::Timestamp;

// ----------------------------------------------------------------------------
// Log Entries
// ----------------------------------------------------------------------------

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Timestamped, human-readable session event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: Timestamp,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(timestamp: Timestamp, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            level,
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp, self.message)
    }
}

// ----------------------------------------------------------------------------
// Sinks
// ----------------------------------------------------------------------------

/// Append-only observer of session log entries
pub trait EventLogSink: Send {
    fn record(&mut self, entry: &LogEntry);
}

impl<F> EventLogSink for F
where
    F: FnMut(&LogEntry) + Send,
{
    fn record(&mut self, entry: &LogEntry) {
        self(entry)
    }
}

/// In-memory log that drops its oldest block of entries once full
#[derive(Debug, Clone)]
pub struct BoundedLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    trim_block: usize,
}

impl BoundedLog {
    pub fn new(config: &LogConfig) -> Self {
        Self {
            entries: VecDeque::with_capacity(config.capacity.min(1024)),
            capacity: config.capacity.max(1),
            trim_block: config.trim_block.clamp(1, config.capacity.max(1)),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// All retained entries, one per line
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for BoundedLog {
    fn default() -> Self {
        Self::new(&LogConfig::default())
    }
}

impl EventLogSink for BoundedLog {
    fn record(&mut self, entry: &LogEntry) {
        self.entries.push_back(entry.clone());
        if self.entries.len() > self.capacity {
            let drop_count = self.trim_block.min(self.entries.len());
            self.entries.drain(..drop_count);
        }
    }
}

/// Forwards entries to the `tracing` subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventLogSink for TracingSink {
    fn record(&mut self, entry: &LogEntry) {
        match entry.level {
            LogLevel::Debug => tracing::debug!(target: "nodelink::session", "{}", entry.message),
            LogLevel::Info => tracing::info!(target: "nodelink::session", "{}", entry.message),
            LogLevel::Warn => tracing::warn!(target: "nodelink::session", "{}", entry.message),
            LogLevel::Error => tracing::error!(target: "nodelink::session", "{}", entry.message),
        }
    }
}
