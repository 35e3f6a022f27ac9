//! Typed messages exchanged with the session
//!
//! All communication with the session flows through these message types:
//! [`Command`]s from the UI, [`Event`]s from the transport, [`Effect`]s back to
//! the transport and [`AppEvent`]s out to observers.

pub mod communication;

pub use communication::{AppEvent, Command, Effect, Event};
