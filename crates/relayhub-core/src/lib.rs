//! relayhub Core - Fundamental types and primitives
//!
//! This crate defines the core types shared by every relayhub layer:
//! - Identifiers (NodeId, MacAddress, ActionId)
//! - Relay channels and per-node relay vectors
//! - Time primitives (WallTime, MonoTime)
//! - The workspace error type

pub mod id;
pub mod relay;
pub mod time;
pub mod error;

pub use id::*;
pub use relay::*;
pub use time::*;
pub use error::*;
