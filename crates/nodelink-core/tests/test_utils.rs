//! Test utilities for driving the node session deterministically
//!
//! Provides a manual clock and helpers that walk a session through the
//! connection handshake without any transport.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nodelink_core::{
    AppEvent, Effect, EndpointRole, Event, LogEntry, Output, PeripheralHandle, PeripheralId,
    RadioState, Session, SessionConfig, TimeSource, Timestamp, NODE_SERVICE_UUID,
};

// ----------------------------------------------------------------------------
// Manual Clock
// ----------------------------------------------------------------------------

/// Clock that only moves when the test says so
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set_time(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.now.load(Ordering::SeqCst))
    }
}

// ----------------------------------------------------------------------------
// Session Helpers
// ----------------------------------------------------------------------------

/// Session on a manual clock with the radio already powered on
pub fn powered_session(config: SessionConfig) -> (Session<ManualClock>, ManualClock) {
    let clock = ManualClock::new();
    let mut session = Session::with_clock(config, clock.clone());
    session.handle_event(Event::RadioStateChanged {
        state: RadioState::PoweredOn,
    });
    (session, clock)
}

pub fn node(id: &str, name: &str) -> PeripheralHandle {
    PeripheralHandle::new(id, Some(name.to_string()))
}

pub fn all_characteristics() -> Vec<uuid::Uuid> {
    EndpointRole::ALL.iter().map(|role| role.uuid()).collect()
}

/// Walk the session from `Idle` to `Ready` against `peripheral`
pub fn connect_ready(session: &mut Session<ManualClock>, peripheral: &str) -> Output {
    let peripheral = PeripheralId::new(peripheral);
    let mut out = session.handle_command(nodelink_core::Command::Connect {
        peripheral: peripheral.clone(),
    });
    out.extend(session.handle_event(Event::ConnectResult {
        peripheral,
        result: Ok(()),
    }));
    out.extend(session.handle_event(Event::ServiceList {
        result: Ok(vec![NODE_SERVICE_UUID]),
    }));
    out.extend(session.handle_event(Event::CharacteristicList {
        result: Ok(all_characteristics()),
    }));
    out
}

pub fn notify(role: EndpointRole, value: &[u8]) -> Event {
    Event::NotifyValue {
        characteristic: role.uuid(),
        value: value.to_vec(),
    }
}

/// Log messages in emission order
pub fn log_messages(out: &Output) -> Vec<String> {
    out.log_entries().map(|entry: &LogEntry| entry.message.clone()).collect()
}

pub fn writes(out: &Output) -> Vec<(uuid::Uuid, String)> {
    out.effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::Write {
                characteristic,
                payload,
                ..
            } => Some((*characteristic, String::from_utf8_lossy(payload).into_owned())),
            _ => None,
        })
        .collect()
}

pub fn has_event(out: &Output, predicate: impl Fn(&AppEvent) -> bool) -> bool {
    out.app_events.iter().any(predicate)
}
