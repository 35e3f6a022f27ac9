//! Nodelink Runtime
//!
//! Runs a [`nodelink_core::Session`] against a real or mock [`BleCentral`]:
//! - [`SessionDriver`]: the single task that owns the session and executes its effects
//! - [`RuntimeBuilder`] / [`RuntimeHandle`]: startup and the command/app-event surface
//!
//! The session stays transport-agnostic; everything async lives here.

mod builder;
mod config;
mod driver;
mod error;

pub use builder::{RuntimeBuilder, RuntimeHandle};
pub use config::RuntimeConfig;
pub use driver::SessionDriver;
pub use error::RuntimeError;

// Re-export core types for convenience
pub use nodelink_core::{
    AppEvent, BleCentral, Command, CommandEnvelope, ConnectedChannel, EventLogSink, LogEntry,
    PeripheralId, SessionConfig, SessionState,
};
