//! Nodelink CLI library
//!
//! This library provides the components behind the `nodelink` binary: argument
//! parsing, configuration, the client-side session state, the interactive
//! shell and the one-shot command handlers.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod shell;
pub mod state;

pub use app::NodeApp;
pub use cli::{Cli, Commands, ExecAction};
pub use config::CliAppConfig;
pub use error::{CliError, Result};
pub use state::{ClientState, CompletedFile};
