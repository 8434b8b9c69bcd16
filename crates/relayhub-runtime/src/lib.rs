//! relayhub Runtime - control loop and process wiring
//!
//! This crate provides:
//! - `Hub`, the control loop over the scheduler and the inbound channel
//! - `HubConfig`, loaded from JSON with human-readable durations
//! - Logging setup
//! - `LoggingActuator` for running without relay hardware

pub mod actuator;
pub mod config;
pub mod hub;
pub mod telemetry;

pub use actuator::*;
pub use config::*;
pub use hub::*;
pub use telemetry::{init as init_logging, LogConfig};
