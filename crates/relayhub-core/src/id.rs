//! Identity types for relayhub
//!
//! Nodes are addressed two ways: by a small dense `NodeId` inside the hub,
//! and by the 6-byte hardware address the wireless link delivers to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{HubError, HubResult};

/// Most remote units a hub can address; remote ids are one byte
pub const MAX_REMOTE_NODES: usize = u8::MAX as usize + 1;

/// Node identity inside the hub
///
/// The local relay bank is `-1` in persisted records; remote units get
/// dense ids `0..N` in registration order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum NodeId {
    Local,
    Remote(u8),
}

impl NodeId {
    pub const LOCAL_RAW: i32 = -1;

    /// Remote id for a table index known to be below `MAX_REMOTE_NODES`
    #[inline]
    pub fn remote(index: usize) -> Self {
        debug_assert!(index < MAX_REMOTE_NODES);
        NodeId::Remote(index as u8)
    }

    /// Remote id for an index from outside the table
    pub fn try_remote(index: usize) -> HubResult<Self> {
        u8::try_from(index)
            .map(NodeId::Remote)
            .map_err(|_| HubError::InvalidNodeId(i32::try_from(index).unwrap_or(i32::MAX)))
    }

    #[inline]
    pub fn is_local(self) -> bool {
        matches!(self, NodeId::Local)
    }

    /// Index into the remote table, `None` for the local node
    #[inline]
    pub fn remote_index(self) -> Option<usize> {
        match self {
            NodeId::Local => None,
            NodeId::Remote(i) => Some(i as usize),
        }
    }

    #[inline]
    pub fn as_raw(self) -> i32 {
        match self {
            NodeId::Local => Self::LOCAL_RAW,
            NodeId::Remote(i) => i as i32,
        }
    }

    pub fn from_raw(raw: i32) -> HubResult<Self> {
        match raw {
            Self::LOCAL_RAW => Ok(NodeId::Local),
            0..=255 => Ok(NodeId::Remote(raw as u8)),
            _ => Err(HubError::InvalidNodeId(raw)),
        }
    }
}

impl From<NodeId> for i32 {
    fn from(id: NodeId) -> i32 {
        id.as_raw()
    }
}

impl TryFrom<i32> for NodeId {
    type Error = HubError;

    fn try_from(raw: i32) -> HubResult<Self> {
        NodeId::from_raw(raw)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Local => write!(f, "Node(local)"),
            NodeId::Remote(i) => write!(f, "Node({})", i),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_raw())
    }
}

/// Hardware address of a remote unit (6 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const LEN: usize = 6;
    pub const BROADCAST: MacAddress = MacAddress([0xFF; 6]);

    #[inline]
    pub fn new(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 6] {
        self.0
    }

    pub fn from_slice(buf: &[u8]) -> HubResult<Self> {
        let bytes: [u8; 6] = buf.try_into().map_err(|_| HubError::BufferTooShort {
            expected: Self::LEN,
            actual: buf.len(),
        })?;
        Ok(MacAddress(bytes))
    }
}

impl FromStr for MacAddress {
    type Err = HubError;

    /// Accepts `AA:BB:CC:DD:EE:FF` or `aa-bb-cc-dd-ee-ff`
    fn from_str(s: &str) -> HubResult<Self> {
        let malformed = || HubError::MalformedAddress(s.to_string());
        let parts: Vec<&str> = s.trim().split([':', '-']).collect();
        if parts.len() != Self::LEN {
            return Err(malformed());
        }

        let mut bytes = [0u8; 6];
        for (slot, part) in bytes.iter_mut().zip(parts) {
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(malformed());
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| malformed())?;
        }
        Ok(MacAddress(bytes))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mac({})", self)
    }
}

impl Serialize for MacAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Scheduled action identity - insertion sequence number
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ActionId(pub u32);

impl ActionId {
    #[inline]
    pub fn new(id: u32) -> Self {
        ActionId(id)
    }
}

impl fmt::Debug for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action({})", self.0)
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
