//! Peer directory - the hub's set of nodes
//!
//! Holds the local relay bank and every registered remote unit. Remote ids
//! are dense and never reused: a unit keeps its id for the process lifetime.

use relayhub_core::{
    HubError, HubResult, MacAddress, NodeId, RelayIndex, RelayStates, WallTime,
    MAX_REMOTE_NODES,
};
use relayhub_store::{NodeRecord, PeerRecord};
use relayhub_transport::Transport;

/// Default cap on remote units
pub const DEFAULT_MAX_NODES: usize = 20;

/// Result of registering an address
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    /// A new entry was created
    Created(NodeId),
    /// The address was already known; its existing id is reused
    Existing(NodeId),
    /// Known address whose display name was changed by this registration
    Renamed(NodeId),
}

impl Registration {
    #[inline]
    pub fn id(self) -> NodeId {
        match self {
            Registration::Created(id)
            | Registration::Existing(id)
            | Registration::Renamed(id) => id,
        }
    }

    #[inline]
    pub fn is_new(self) -> bool {
        matches!(self, Registration::Created(_))
    }

    /// Whether the peer list differs from before the call
    #[inline]
    pub fn changed_directory(self) -> bool {
        !matches!(self, Registration::Existing(_))
    }
}

/// Point-in-time view of one node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub id: NodeId,
    /// `None` for the local node
    pub address: Option<MacAddress>,
    pub name: String,
    pub relays: RelayStates,
    /// Set on any status report; always true for the local node
    pub active: bool,
    pub last_seen: Option<WallTime>,
}

#[derive(Clone, Debug)]
struct RemoteNode {
    address: MacAddress,
    name: String,
    relays: RelayStates,
    active: bool,
    last_seen: Option<WallTime>,
}

/// Name given to units that report in before anyone registered them
pub fn default_name(address: MacAddress) -> String {
    let b = address.to_bytes();
    format!("Node-{:02X}{:02X}", b[4], b[5])
}

/// Registry of the local node and known remote units
#[derive(Debug)]
pub struct PeerDirectory {
    local_name: String,
    local_relays: RelayStates,
    remotes: Vec<RemoteNode>,
    max_nodes: usize,
}

impl PeerDirectory {
    /// `max_nodes` is capped at `MAX_REMOTE_NODES`
    pub fn new(local_name: impl Into<String>, max_nodes: usize) -> Self {
        if max_nodes > MAX_REMOTE_NODES {
            tracing::warn!(
                "max_nodes {} exceeds the {} addressable units, capping",
                max_nodes,
                MAX_REMOTE_NODES
            );
        }
        let max_nodes = max_nodes.min(MAX_REMOTE_NODES);
        PeerDirectory {
            local_name: local_name.into(),
            local_relays: RelayStates::ALL_OFF,
            remotes: Vec::new(),
            max_nodes,
        }
    }

    /// Register a remote unit
    ///
    /// A known address keeps its id (the name is updated if a non-empty,
    /// different one is given, reported as `Renamed`). A new address is first added to the transport's peer
    /// table; if that fails nothing is committed here either.
    pub fn register(
        &mut self,
        address: MacAddress,
        name: &str,
        transport: &dyn Transport,
    ) -> HubResult<Registration> {
        let name = name.trim();

        if let Some(id) = self.find_by_address(address) {
            if let Some(index) = id.remote_index() {
                let node = &mut self.remotes[index];
                if !name.is_empty() && node.name != name {
                    node.name = name.to_string();
                    return Ok(Registration::Renamed(id));
                }
            }
            return Ok(Registration::Existing(id));
        }

        if self.remotes.len() >= self.max_nodes {
            return Err(HubError::CapacityExceeded {
                table: "node",
                limit: self.max_nodes,
            });
        }

        let id = NodeId::try_remote(self.remotes.len())?;
        transport.add_peer(address)?;

        self.remotes.push(RemoteNode {
            address,
            name: if name.is_empty() {
                default_name(address)
            } else {
                name.to_string()
            },
            relays: RelayStates::ALL_OFF,
            active: false,
            last_seen: None,
        });
        Ok(Registration::Created(id))
    }

    pub fn find_by_address(&self, address: MacAddress) -> Option<NodeId> {
        self.remotes
            .iter()
            .position(|n| n.address == address)
            .map(NodeId::remote)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        match id.remote_index() {
            None => true,
            Some(index) => index < self.remotes.len(),
        }
    }

    fn remote(&self, id: NodeId) -> HubResult<Option<&RemoteNode>> {
        match id.remote_index() {
            None => Ok(None),
            Some(index) => self
                .remotes
                .get(index)
                .map(Some)
                .ok_or(HubError::UnknownNode(id)),
        }
    }

    fn remote_mut(&mut self, id: NodeId) -> HubResult<Option<&mut RemoteNode>> {
        match id.remote_index() {
            None => Ok(None),
            Some(index) => self
                .remotes
                .get_mut(index)
                .map(Some)
                .ok_or(HubError::UnknownNode(id)),
        }
    }

    pub fn get_state(&self, id: NodeId) -> HubResult<RelayStates> {
        Ok(match self.remote(id)? {
            None => self.local_relays,
            Some(node) => node.relays,
        })
    }

    /// Set one channel; returns whether the value changed
    ///
    /// Setting a channel to its current value is a no-op, and callers must
    /// not log or persist for it.
    pub fn set_state(&mut self, id: NodeId, relay: RelayIndex, on: bool) -> HubResult<bool> {
        let relays = match id.remote_index() {
            None => &mut self.local_relays,
            Some(index) => {
                &mut self
                    .remotes
                    .get_mut(index)
                    .ok_or(HubError::UnknownNode(id))?
                    .relays
            }
        };
        Ok(relays.set(relay, on))
    }

    pub fn name(&self, id: NodeId) -> HubResult<&str> {
        Ok(match self.remote(id)? {
            None => &self.local_name,
            Some(node) => &node.name,
        })
    }

    pub fn address(&self, id: NodeId) -> HubResult<Option<MacAddress>> {
        Ok(self.remote(id)?.map(|node| node.address))
    }

    /// Change a display name; returns whether it changed
    pub fn rename(&mut self, id: NodeId, name: &str) -> HubResult<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HubError::InvalidName(name.to_string()));
        }

        let slot = match id.remote_index() {
            None => &mut self.local_name,
            Some(index) => {
                &mut self
                    .remotes
                    .get_mut(index)
                    .ok_or(HubError::UnknownNode(id))?
                    .name
            }
        };
        if slot.as_str() == name {
            return Ok(false);
        }
        *slot = name.to_string();
        Ok(true)
    }

    /// Record a status report from a remote unit
    pub fn mark_seen(&mut self, id: NodeId, at: WallTime) -> HubResult<()> {
        if let Some(node) = self.remote_mut(id)? {
            node.active = true;
            node.last_seen = Some(at);
        }
        Ok(())
    }

    /// Number of remote units
    pub fn len(&self) -> usize {
        self.remotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remotes.is_empty()
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    /// All nodes, local first, then remotes in registration order
    pub fn all_nodes(&self) -> Vec<NodeSnapshot> {
        let local = NodeSnapshot {
            id: NodeId::Local,
            address: None,
            name: self.local_name.clone(),
            relays: self.local_relays,
            active: true,
            last_seen: None,
        };

        std::iter::once(local)
            .chain(self.remotes.iter().enumerate().map(|(i, n)| NodeSnapshot {
                id: NodeId::remote(i),
                address: Some(n.address),
                name: n.name.clone(),
                relays: n.relays,
                active: n.active,
                last_seen: n.last_seen,
            }))
            .collect()
    }

    /// Peer list in registration order
    pub fn peer_records(&self) -> Vec<PeerRecord> {
        self.remotes
            .iter()
            .map(|n| PeerRecord {
                address: n.address,
                name: n.name.clone(),
            })
            .collect()
    }

    /// Current state table, local first
    pub fn snapshot_records(&self) -> Vec<NodeRecord> {
        std::iter::once(NodeRecord {
            node: NodeId::Local,
            address: None,
            relays: self.local_relays,
        })
        .chain(self.remotes.iter().enumerate().map(|(i, n)| NodeRecord {
            node: NodeId::remote(i),
            address: Some(n.address),
            relays: n.relays,
        }))
        .collect()
    }

    /// Load relay vectors from a saved table without producing any
    /// transitions. Rows for units no longer known are skipped.
    /// Returns the number of rows applied.
    pub fn restore_state(&mut self, records: &[NodeRecord]) -> usize {
        let mut applied = 0;
        for record in records {
            let target = match record.address {
                Some(address) => self.find_by_address(address),
                None if record.node.is_local() => Some(NodeId::Local),
                None => self.contains(record.node).then_some(record.node),
            };

            let Some(id) = target else {
                tracing::debug!("skipping snapshot row for unknown node {:?}", record.node);
                continue;
            };

            match id.remote_index() {
                None => self.local_relays = record.relays,
                Some(index) => self.remotes[index].relays = record.relays,
            }
            applied += 1;
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use relayhub_transport::SendOutcome;

    /// Transport that records peer registrations and can refuse them
    #[derive(Default)]
    struct PeerTable {
        peers: Mutex<Vec<MacAddress>>,
        refuse: bool,
    }

    impl Transport for PeerTable {
        fn add_peer(&self, address: MacAddress) -> HubResult<()> {
            if self.refuse {
                return Err(HubError::PeerRegistrationFailed {
                    address,
                    reason: "radio refused".into(),
                });
            }
            self.peers.lock().push(address);
            Ok(())
        }

        fn send(&self, _address: MacAddress, _payload: &[u8]) -> SendOutcome {
            SendOutcome::Success
        }
    }

    fn mac(last: u8) -> MacAddress {
        MacAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, last])
    }

    fn relay(i: u8) -> RelayIndex {
        RelayIndex::new(i).unwrap()
    }

    #[test]
    fn test_register_assigns_dense_ids() {
        let link = PeerTable::default();
        let mut dir = PeerDirectory::new("Hub", 4);

        assert_eq!(
            dir.register(mac(1), "Kitchen", &link).unwrap(),
            Registration::Created(NodeId::Remote(0))
        );
        assert_eq!(
            dir.register(mac(2), "Garage", &link).unwrap(),
            Registration::Created(NodeId::Remote(1))
        );
        assert_eq!(link.peers.lock().len(), 2);
        assert_eq!(dir.find_by_address(mac(2)), Some(NodeId::Remote(1)));
        assert_eq!(dir.find_by_address(mac(3)), None);
    }

    #[test]
    fn test_reregistration_reuses_id() {
        let link = PeerTable::default();
        let mut dir = PeerDirectory::new("Hub", 4);
        dir.register(mac(1), "Kitchen", &link).unwrap();
        let before = dir.all_nodes().len();

        let again = dir.register(mac(1), "Kitchen Lights", &link).unwrap();
        assert_eq!(again, Registration::Renamed(NodeId::Remote(0)));
        assert_eq!(dir.all_nodes().len(), before);
        assert_eq!(dir.name(NodeId::Remote(0)).unwrap(), "Kitchen Lights");

        assert_eq!(
            dir.register(mac(1), "Kitchen Lights", &link).unwrap(),
            Registration::Existing(NodeId::Remote(0))
        );
        assert_eq!(
            dir.register(mac(1), "", &link).unwrap(),
            Registration::Existing(NodeId::Remote(0))
        );
        // No second transport registration
        assert_eq!(link.peers.lock().len(), 1);
    }

    #[test]
    fn test_node_cap_limited_to_one_byte_ids() {
        let link = PeerTable::default();
        let mut dir = PeerDirectory::new("Hub", 300);
        assert_eq!(dir.max_nodes(), MAX_REMOTE_NODES);

        let addr = |i: usize| MacAddress::new([0x02, 0, 0, 0, (i >> 8) as u8, i as u8]);
        for i in 0..MAX_REMOTE_NODES {
            dir.register(addr(i), &format!("n{}", i), &link).unwrap();
        }
        assert_eq!(dir.find_by_address(addr(255)), Some(NodeId::Remote(255)));

        assert!(matches!(
            dir.register(addr(256), "n256", &link),
            Err(HubError::CapacityExceeded { limit: 256, .. })
        ));
        assert_eq!(dir.find_by_address(addr(256)), None);

        dir.set_state(NodeId::Remote(255), relay(0), true).unwrap();
        assert_eq!(dir.get_state(NodeId::Remote(0)).unwrap(), RelayStates::ALL_OFF);
        assert_eq!(dir.name(NodeId::Remote(0)).unwrap(), "n0");
    }

    #[test]
    fn test_capacity_exceeded() {
        let link = PeerTable::default();
        let mut dir = PeerDirectory::new("Hub", 1);
        dir.register(mac(1), "A", &link).unwrap();

        assert!(matches!(
            dir.register(mac(2), "B", &link),
            Err(HubError::CapacityExceeded { table: "node", limit: 1 })
        ));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_transport_refusal_commits_nothing() {
        let link = PeerTable {
            refuse: true,
            ..Default::default()
        };
        let mut dir = PeerDirectory::new("Hub", 4);

        assert!(dir.register(mac(1), "Kitchen", &link).is_err());
        assert!(dir.is_empty());
        assert_eq!(dir.find_by_address(mac(1)), None);
    }

    #[test]
    fn test_empty_name_gets_default() {
        let link = PeerTable::default();
        let mut dir = PeerDirectory::new("Hub", 4);
        let id = dir.register(mac(0x42), "  ", &link).unwrap().id();
        assert_eq!(dir.name(id).unwrap(), "Node-EE42");
    }

    #[test]
    fn test_set_state_is_idempotent() {
        let link = PeerTable::default();
        let mut dir = PeerDirectory::new("Hub", 4);
        let id = dir.register(mac(1), "Kitchen", &link).unwrap().id();

        assert!(dir.set_state(id, relay(2), true).unwrap());
        assert!(!dir.set_state(id, relay(2), true).unwrap());
        assert!(dir.get_state(id).unwrap().get(relay(2)));

        assert!(dir.set_state(NodeId::Local, relay(0), true).unwrap());
        assert!(dir.get_state(NodeId::Local).unwrap().get(relay(0)));
    }

    #[test]
    fn test_unknown_node_rejected() {
        let mut dir = PeerDirectory::new("Hub", 4);
        assert!(matches!(
            dir.set_state(NodeId::Remote(3), relay(0), true),
            Err(HubError::UnknownNode(NodeId::Remote(3)))
        ));
        assert!(dir.get_state(NodeId::Remote(0)).is_err());
    }

    #[test]
    fn test_all_nodes_order_and_liveness() {
        let link = PeerTable::default();
        let mut dir = PeerDirectory::new("Hub", 4);
        dir.register(mac(1), "Kitchen", &link).unwrap();
        dir.register(mac(2), "Garage", &link).unwrap();
        dir.mark_seen(NodeId::Remote(1), WallTime::from_secs(42)).unwrap();

        let nodes = dir.all_nodes();
        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![NodeId::Local, NodeId::Remote(0), NodeId::Remote(1)]);
        assert_eq!(nodes[0].name, "Hub");
        assert!(!nodes[1].active);
        assert!(nodes[2].active);
        assert_eq!(nodes[2].last_seen, Some(WallTime::from_secs(42)));
    }

    #[test]
    fn test_restore_matches_by_address() {
        let link = PeerTable::default();
        let mut dir = PeerDirectory::new("Hub", 4);
        dir.register(mac(2), "Garage", &link).unwrap();

        let records = vec![
            NodeRecord {
                node: NodeId::Local,
                address: None,
                relays: RelayStates::new([true, true, false, false]),
            },
            // Saved as id 1, but the unit now sits at id 0
            NodeRecord {
                node: NodeId::Remote(1),
                address: Some(mac(2)),
                relays: RelayStates::new([false, false, false, true]),
            },
            NodeRecord {
                node: NodeId::Remote(0),
                address: Some(mac(9)),
                relays: RelayStates::new([true, true, true, true]),
            },
        ];

        assert_eq!(dir.restore_state(&records), 2);
        assert_eq!(
            dir.get_state(NodeId::Local).unwrap(),
            RelayStates::new([true, true, false, false])
        );
        assert_eq!(
            dir.get_state(NodeId::Remote(0)).unwrap(),
            RelayStates::new([false, false, false, true])
        );
    }

    #[test]
    fn test_rename() {
        let link = PeerTable::default();
        let mut dir = PeerDirectory::new("Hub", 4);
        let id = dir.register(mac(1), "Kitchen", &link).unwrap().id();

        assert!(dir.rename(id, "Pantry").unwrap());
        assert!(!dir.rename(id, "Pantry").unwrap());
        assert!(dir.rename(id, "").is_err());
        assert!(dir.rename(NodeId::Local, "Panel").unwrap());
        assert_eq!(dir.peer_records()[0].name, "Pantry");
        assert_eq!(dir.all_nodes()[0].name, "Panel");
    }
}
