//! relayhub Test Harness - chaos testing and end-to-end validation
//!
//! This crate provides:
//! - A lossy, reordering, duplicating in-memory link
//! - Simulated remote relay units
//! - A hub simulator tying both to a real `Hub`
//! - End-to-end scenarios with invariant checks

pub mod chaos;
pub mod simulator;
pub mod integration;

pub use chaos::*;
pub use simulator::*;
pub use integration::*;
