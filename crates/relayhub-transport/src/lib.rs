//! relayhub Transport Layer - the wireless link boundary
//!
//! This crate provides:
//! - The `Transport` trait the hub core sends through
//! - Inbound message channel types (receive side)
//! - `UdpLink`, a datagram link over UDP for running without radio hardware

pub mod link;
pub mod udp;

pub use link::*;
pub use udp::*;
