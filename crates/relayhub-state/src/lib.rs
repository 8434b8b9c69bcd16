//! relayhub State Engine - relay state synchronization
//!
//! This crate implements the hub's state core:
//! - Peer directory (known units, relay vectors, liveness)
//! - Event log with on-duration derivation
//! - Deferred-action scheduler
//! - State synchronizer (commands, optimistic updates, reconciliation)

pub mod directory;
pub mod log;
pub mod scheduler;
pub mod sync;

pub use directory::*;
pub use log::*;
pub use scheduler::*;
pub use sync::*;
