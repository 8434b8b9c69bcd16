//! relayhub Time - time sources for the hub core
//!
//! This crate implements the two clocks the core consumes:
//! - Wall clock: stamps log records (RTC-equivalent, may be stepped)
//! - Monotonic clock: drives scheduled actions, never goes backwards
//!
//! `SystemClock` backs both with the OS; `ManualClock` is driven explicitly
//! and is what simulations and tests use.

pub mod clock;

pub use clock::*;
