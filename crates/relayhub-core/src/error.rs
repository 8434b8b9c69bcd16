//! Error types for relayhub

use std::time::Duration;

use thiserror::Error;

use crate::{ActionId, MacAddress, NodeId};

/// Core relayhub errors
///
/// None of these is fatal to the process; every one is recoverable at the
/// call site.
#[derive(Error, Debug)]
pub enum HubError {
    // Capacity errors
    #[error("Capacity exceeded: {table} table is full ({limit} entries)")]
    CapacityExceeded { table: &'static str, limit: usize },

    // Validation errors
    #[error("Invalid delay {requested:?}: must be within {min:?}..={max:?}")]
    InvalidDelay {
        requested: Duration,
        min: Duration,
        max: Duration,
    },

    #[error("Malformed address: {0:?}")]
    MalformedAddress(String),

    #[error("Invalid relay index: {0}")]
    InvalidRelay(u8),

    #[error("Invalid node name: {0:?}")]
    InvalidName(String),

    #[error("Invalid node id: {0}")]
    InvalidNodeId(i32),

    #[error("Unknown node: {0:?}")]
    UnknownNode(NodeId),

    #[error("Unknown scheduled action: {0:?}")]
    UnknownAction(ActionId),

    // Wire errors
    #[error("Invalid wire format: {0}")]
    InvalidWireFormat(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Unknown message type: {0:#04x}")]
    UnknownMessageType(u8),

    // Transport errors
    #[error("Peer registration failed for {address}: {reason}")]
    PeerRegistrationFailed { address: MacAddress, reason: String },

    #[error("Transport error: {0}")]
    TransportError(String),

    // Persistence errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for relayhub operations
pub type HubResult<T> = Result<T, HubError>;
