//! Clock implementations

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use relayhub_core::{MonoTime, WallTime};

/// Time source consumed by the log and the scheduler
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn wall_now(&self) -> WallTime;

    /// Current monotonic time
    fn mono_now(&self) -> MonoTime;
}

/// OS-backed clock
pub struct SystemClock {
    /// Monotonic reference taken at construction
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn wall_now(&self) -> WallTime {
        // A clock set before the epoch reads as the epoch
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        WallTime::from_secs(secs)
    }

    fn mono_now(&self) -> MonoTime {
        MonoTime::from_duration(self.start.elapsed())
    }
}

struct ManualState {
    wall: WallTime,
    mono: MonoTime,
}

/// Explicitly driven clock
///
/// `advance` moves both bases together; `set_wall` steps only the wall
/// clock, the way an RTC resync would.
pub struct ManualClock {
    state: Mutex<ManualState>,
}

impl ManualClock {
    pub fn new(wall: WallTime) -> Self {
        ManualClock {
            state: Mutex::new(ManualState {
                wall,
                mono: MonoTime::ZERO,
            }),
        }
    }

    pub fn advance(&self, d: Duration) {
        let mut state = self.state.lock();
        state.wall = state.wall + d;
        state.mono = state.mono + d;
    }

    pub fn set_wall(&self, wall: WallTime) {
        self.state.lock().wall = wall;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(WallTime::EPOCH)
    }
}

impl Clock for ManualClock {
    fn wall_now(&self) -> WallTime {
        self.state.lock().wall
    }

    fn mono_now(&self) -> MonoTime {
        self.state.lock().mono
    }
}
