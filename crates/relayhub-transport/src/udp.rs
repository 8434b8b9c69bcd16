//! UDP datagram link
//!
//! Emulates the connectionless wireless link over UDP: every datagram is an
//! `Envelope` carrying the sender's hardware address, and a route table maps
//! hardware addresses to socket endpoints.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use relayhub_core::{HubError, HubResult, MacAddress};
use relayhub_wire::{Envelope, MAX_ENVELOPE_SIZE};
use tokio::net::UdpSocket;

use crate::{inbound_channel, Inbound, InboundReceiver, SendOutcome, Transport};

/// Peer table limit of the radio stack being emulated
pub const DEFAULT_MAX_PEERS: usize = 20;

/// UDP-backed datagram link
pub struct UdpLink {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    /// Hardware address this link sends as
    own_address: MacAddress,
    /// Where each hardware address can be reached
    routes: RwLock<HashMap<MacAddress, SocketAddr>>,
    /// Addresses registered as deliverable
    peers: RwLock<HashSet<MacAddress>>,
    max_peers: usize,
}

impl UdpLink {
    /// Bind to a local address
    pub async fn bind(addr: SocketAddr, own_address: MacAddress) -> HubResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| HubError::TransportError(e.to_string()))?;

        let local_addr = socket
            .local_addr()
            .map_err(|e| HubError::TransportError(e.to_string()))?;

        Ok(UdpLink {
            socket: Arc::new(socket),
            local_addr,
            own_address,
            routes: RwLock::new(HashMap::new()),
            peers: RwLock::new(HashSet::new()),
            max_peers: DEFAULT_MAX_PEERS,
        })
    }

    pub fn with_max_peers(mut self, max_peers: usize) -> Self {
        self.max_peers = max_peers;
        self
    }

    /// Get local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn own_address(&self) -> MacAddress {
        self.own_address
    }

    /// Record where a hardware address lives
    pub fn add_route(&self, address: MacAddress, endpoint: SocketAddr) {
        self.routes.write().insert(address, endpoint);
    }

    pub fn is_peer(&self, address: MacAddress) -> bool {
        self.peers.read().contains(&address)
    }

    /// Start the background receive loop
    ///
    /// Senders' endpoints are learned into the route table, so a unit that
    /// reports in can be registered and commanded without prior config.
    pub fn start_receive_loop(self: &Arc<Self>, buffer_size: usize) -> InboundReceiver {
        let (tx, rx) = inbound_channel(buffer_size);
        let link = Arc::clone(self);

        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_ENVELOPE_SIZE];
            loop {
                match link.socket.recv_from(&mut buf).await {
                    Ok((len, addr)) => {
                        let envelope = match Envelope::parse(&buf[..len]) {
                            Ok(envelope) => envelope,
                            Err(e) => {
                                tracing::warn!("dropping datagram from {}: {}", addr, e);
                                continue;
                            }
                        };

                        link.add_route(envelope.sender, addr);
                        let inbound = Inbound::new(envelope.sender, envelope.payload);
                        if tx.send(inbound).await.is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(e) => {
                        tracing::warn!("UDP receive error: {}", e);
                    }
                }
            }
        });

        rx
    }
}

impl Transport for UdpLink {
    fn add_peer(&self, address: MacAddress) -> HubResult<()> {
        let mut peers = self.peers.write();
        if peers.contains(&address) {
            return Ok(());
        }

        if !self.routes.read().contains_key(&address) {
            return Err(HubError::PeerRegistrationFailed {
                address,
                reason: "no known endpoint".into(),
            });
        }

        if peers.len() >= self.max_peers {
            return Err(HubError::PeerRegistrationFailed {
                address,
                reason: format!("peer table full ({})", self.max_peers),
            });
        }
        peers.insert(address);
        Ok(())
    }

    fn send(&self, address: MacAddress, payload: &[u8]) -> SendOutcome {
        if !self.is_peer(address) {
            tracing::warn!("send to unregistered peer {}", address);
            return SendOutcome::Failure;
        }

        let Some(endpoint) = self.routes.read().get(&address).copied() else {
            return SendOutcome::Failure;
        };

        let bytes = match Envelope::new(self.own_address, payload.to_vec()).serialize() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("cannot frame payload for {}: {}", address, e);
                return SendOutcome::Failure;
            }
        };

        match self.socket.try_send_to(&bytes, endpoint) {
            Ok(_) => SendOutcome::Success,
            Err(e) => {
                tracing::warn!("UDP send to {} ({}) failed: {}", address, endpoint, e);
                SendOutcome::Failure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn mac(last: u8) -> MacAddress {
        MacAddress::new([0x02, 0, 0, 0, 0, last])
    }

    #[tokio::test]
    async fn test_udp_link_bind() {
        let link = UdpLink::bind("127.0.0.1:0".parse().unwrap(), mac(1))
            .await
            .unwrap();

        assert_ne!(link.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_add_peer_requires_route() {
        let link = UdpLink::bind("127.0.0.1:0".parse().unwrap(), mac(1))
            .await
            .unwrap();

        assert!(matches!(
            link.add_peer(mac(2)),
            Err(HubError::PeerRegistrationFailed { .. })
        ));
        assert!(!link.is_peer(mac(2)));

        link.add_route(mac(2), "127.0.0.1:9".parse().unwrap());
        link.add_peer(mac(2)).unwrap();
        assert!(link.is_peer(mac(2)));
    }

    #[tokio::test]
    async fn test_peer_table_limit() {
        let link = UdpLink::bind("127.0.0.1:0".parse().unwrap(), mac(1))
            .await
            .unwrap()
            .with_max_peers(1);

        link.add_route(mac(2), "127.0.0.1:9".parse().unwrap());
        link.add_route(mac(3), "127.0.0.1:9".parse().unwrap());
        link.add_peer(mac(2)).unwrap();
        assert!(link.add_peer(mac(3)).is_err());
        // Re-adding a known peer is not a new slot
        link.add_peer(mac(2)).unwrap();
    }

    #[tokio::test]
    async fn test_send_to_unregistered_peer_fails() {
        let link = UdpLink::bind("127.0.0.1:0".parse().unwrap(), mac(1))
            .await
            .unwrap();

        assert_eq!(link.send(mac(9), &[0x01, 0, 1]), SendOutcome::Failure);
    }

    #[tokio::test]
    async fn test_send_and_receive_between_links() {
        let hub = Arc::new(
            UdpLink::bind("127.0.0.1:0".parse().unwrap(), mac(1))
                .await
                .unwrap(),
        );
        let unit = Arc::new(
            UdpLink::bind("127.0.0.1:0".parse().unwrap(), mac(2))
                .await
                .unwrap(),
        );

        let mut hub_rx = hub.start_receive_loop(16);
        let mut unit_rx = unit.start_receive_loop(16);

        unit.add_route(mac(1), hub.local_addr());
        unit.add_peer(mac(1)).unwrap();
        assert!(unit.send(mac(1), &[0x02, 1, 0, 0, 0, 0]).is_success());

        let inbound = tokio::time::timeout(Duration::from_secs(2), hub_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inbound.from, mac(2));
        assert_eq!(&inbound.payload[..], &[0x02, 1, 0, 0, 0, 0]);

        // The hub learned the unit's endpoint from that datagram
        hub.add_peer(mac(2)).unwrap();
        assert!(hub.send(mac(2), &[0x01, 3, 1]).is_success());

        let inbound = tokio::time::timeout(Duration::from_secs(2), unit_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inbound.from, mac(1));
        assert_eq!(&inbound.payload[..], &[0x01, 3, 1]);
    }
}
