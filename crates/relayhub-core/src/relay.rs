//! Relay channels and per-node relay vectors

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{HubError, HubResult};

/// Number of relay channels on every node
pub const RELAY_CHANNELS: usize = 4;

/// Relay channel index, always `< RELAY_CHANNELS`
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub struct RelayIndex(u8);

impl RelayIndex {
    pub fn new(index: u8) -> HubResult<Self> {
        if (index as usize) < RELAY_CHANNELS {
            Ok(RelayIndex(index))
        } else {
            Err(HubError::InvalidRelay(index))
        }
    }

    #[inline]
    pub fn get(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// All channel indices in order
    pub fn all() -> impl Iterator<Item = RelayIndex> {
        (0..RELAY_CHANNELS as u8).map(RelayIndex)
    }
}

impl From<RelayIndex> for u8 {
    fn from(index: RelayIndex) -> u8 {
        index.0
    }
}

impl TryFrom<u8> for RelayIndex {
    type Error = HubError;

    fn try_from(index: u8) -> HubResult<Self> {
        RelayIndex::new(index)
    }
}

impl fmt::Debug for RelayIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Relay({})", self.0)
    }
}

impl fmt::Display for RelayIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The 4-slot relay vector of a node
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RelayStates(pub [bool; RELAY_CHANNELS]);

impl RelayStates {
    pub const ALL_OFF: RelayStates = RelayStates([false; RELAY_CHANNELS]);

    #[inline]
    pub fn new(states: [bool; RELAY_CHANNELS]) -> Self {
        RelayStates(states)
    }

    #[inline]
    pub fn get(&self, index: RelayIndex) -> bool {
        self.0[index.as_usize()]
    }

    /// Set one channel, returning whether the value changed
    #[inline]
    pub fn set(&mut self, index: RelayIndex, on: bool) -> bool {
        let slot = &mut self.0[index.as_usize()];
        let changed = *slot != on;
        *slot = on;
        changed
    }

    /// Channels whose value differs from `other`
    pub fn diff(&self, other: &RelayStates) -> Vec<RelayIndex> {
        RelayIndex::all()
            .filter(|&i| self.get(i) != other.get(i))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RelayIndex, bool)> + '_ {
        RelayIndex::all().map(move |i| (i, self.get(i)))
    }

    pub fn count_on(&self) -> usize {
        self.0.iter().filter(|on| **on).count()
    }
}

impl fmt::Debug for RelayStates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Relays[")?;
        for on in self.0 {
            write!(f, "{}", if on { '1' } else { '0' })?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_index_bounds() {
        assert!(RelayIndex::new(0).is_ok());
        assert!(RelayIndex::new(3).is_ok());
        assert!(matches!(RelayIndex::new(4), Err(HubError::InvalidRelay(4))));
    }

    #[test]
    fn test_set_reports_change() {
        let mut states = RelayStates::ALL_OFF;
        let r2 = RelayIndex::new(2).unwrap();

        assert!(states.set(r2, true));
        assert!(!states.set(r2, true));
        assert!(states.get(r2));
        assert_eq!(states.count_on(), 1);
    }

    #[test]
    fn test_diff() {
        let a = RelayStates::new([true, false, true, false]);
        let b = RelayStates::new([true, true, false, false]);
        let changed: Vec<u8> = a.diff(&b).into_iter().map(RelayIndex::get).collect();
        assert_eq!(changed, vec![1, 2]);
    }

    #[test]
    fn test_debug_format() {
        let states = RelayStates::new([true, false, false, true]);
        assert_eq!(format!("{:?}", states), "Relays[1001]");
    }
}
