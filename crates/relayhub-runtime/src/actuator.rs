//! Local relay bank stand-in

use parking_lot::Mutex;
use relayhub_core::{RelayIndex, RelayStates};
use relayhub_state::Actuator;

/// Actuator that tracks the line levels it was asked for and logs them
///
/// Used where no relay GPIO is attached.
#[derive(Debug, Default)]
pub struct LoggingActuator {
    lines: Mutex<RelayStates>,
}

impl LoggingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last level written to each line
    pub fn lines(&self) -> RelayStates {
        *self.lines.lock()
    }
}

impl Actuator for LoggingActuator {
    fn set_local_relay(&self, relay: RelayIndex, on: bool) {
        self.lines.lock().set(relay, on);
        tracing::info!("local relay {} {}", relay, if on { "ON" } else { "OFF" });
    }
}
