//! Persisted record types

use std::time::Duration;

use relayhub_core::{MacAddress, NodeId, RelayIndex, RelayStates, WallTime};
use serde::{Deserialize, Serialize};

/// One row of the node state snapshot
///
/// Remote rows carry the unit's address so a restore can match them even
/// if a peer failed to re-register and ids moved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<MacAddress>,
    pub relays: RelayStates,
}

/// One known remote unit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub address: MacAddress,
    pub name: String,
}

/// A relay state transition
///
/// `duration_secs` is how long the channel sat in the previous state,
/// zero when no earlier differing entry was found.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: WallTime,
    pub node: NodeId,
    pub node_name: String,
    pub relay: RelayIndex,
    pub on: bool,
    pub duration_secs: u64,
}

impl LogEntry {
    #[inline]
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Whether this entry describes the given channel
    #[inline]
    pub fn is_channel(&self, node: NodeId, relay: RelayIndex) -> bool {
        self.node == node && self.relay == relay
    }
}
