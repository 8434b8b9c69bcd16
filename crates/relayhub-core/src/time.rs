//! Time primitives for relayhub
//!
//! Two time bases are kept apart:
//! - WallTime: calendar time from the clock module, stamps log records
//! - MonoTime: monotonic time since hub start, drives the scheduler

use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Wall-clock time, whole seconds since the Unix epoch
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WallTime(pub i64);

impl WallTime {
    pub const EPOCH: WallTime = WallTime(0);

    #[inline]
    pub fn from_secs(secs: i64) -> Self {
        WallTime(secs)
    }

    #[inline]
    pub fn as_secs(self) -> i64 {
        self.0
    }

    /// Elapsed time since `earlier`, zero if `earlier` is in the future
    #[inline]
    pub fn since(self, earlier: WallTime) -> Duration {
        self - earlier
    }
}

impl Add<Duration> for WallTime {
    type Output = WallTime;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        WallTime(self.0.saturating_add(rhs.as_secs() as i64))
    }
}

impl Sub<WallTime> for WallTime {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: WallTime) -> Self::Output {
        let diff = self.0.saturating_sub(rhs.0);
        if diff >= 0 {
            Duration::from_secs(diff as u64)
        } else {
            Duration::ZERO
        }
    }
}

impl fmt::Debug for WallTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wall({}s)", self.0)
    }
}

impl fmt::Display for WallTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic time, milliseconds since hub start
/// INVARIANT: never goes backwards within one process
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MonoTime(pub u64);

impl MonoTime {
    pub const ZERO: MonoTime = MonoTime(0);

    #[inline]
    pub fn from_millis(millis: u64) -> Self {
        MonoTime(millis)
    }

    #[inline]
    pub fn from_duration(d: Duration) -> Self {
        MonoTime(d.as_millis() as u64)
    }

    #[inline]
    pub fn as_millis(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn saturating_add(self, d: Duration) -> Self {
        MonoTime(self.0.saturating_add(d.as_millis() as u64))
    }
}

impl Add<Duration> for MonoTime {
    type Output = MonoTime;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl Sub<MonoTime> for MonoTime {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: MonoTime) -> Self::Output {
        Duration::from_millis(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Debug for MonoTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mono({}ms)", self.0)
    }
}
