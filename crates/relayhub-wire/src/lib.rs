//! relayhub Wire Protocol - Binary message format
//!
//! Two fixed-size payloads travel over the wireless link:
//! - Command (hub → unit): one relay, desired state
//! - Status (unit → hub): the unit's full relay vector
//!
//! Datagram links that do not carry the sender address natively wrap the
//! payload in an `Envelope`.

pub mod envelope;
pub mod message;

pub use envelope::*;
pub use message::*;
