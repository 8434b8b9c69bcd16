//! Chaos link for relayhub testing
//!
//! An in-memory stand-in for the wireless medium that can:
//! - Silently lose frames (the sender still sees success)
//! - Report link-layer send failures
//! - Reorder frames
//! - Duplicate frames
//!
//! Randomness comes from a seeded `StdRng`, so every run is reproducible.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use relayhub_core::{HubError, HubResult, MacAddress};
use relayhub_transport::{SendOutcome, Transport};

/// Link impairment settings
#[derive(Clone, Debug)]
pub struct ChaosConfig {
    /// Frames lost after the sender was told they left (0.0 - 1.0)
    pub loss_rate: f64,
    /// Sends that report failure and go nowhere (0.0 - 1.0)
    pub send_failure_rate: f64,
    /// Frames that jump ahead of earlier ones
    pub reorder_prob: f64,
    /// How far back a reordered frame may land
    pub reorder_depth: usize,
    /// Frames delivered twice
    pub duplicate_prob: f64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        ChaosConfig {
            loss_rate: 0.02,
            send_failure_rate: 0.01,
            reorder_prob: 0.05,
            reorder_depth: 3,
            duplicate_prob: 0.01,
        }
    }
}

impl ChaosConfig {
    /// No impairment at all
    pub fn perfect() -> Self {
        ChaosConfig {
            loss_rate: 0.0,
            send_failure_rate: 0.0,
            reorder_prob: 0.0,
            reorder_depth: 0,
            duplicate_prob: 0.0,
        }
    }

    /// A busy 2.4 GHz band
    pub fn poor() -> Self {
        ChaosConfig {
            loss_rate: 0.10,
            send_failure_rate: 0.05,
            reorder_prob: 0.10,
            reorder_depth: 5,
            duplicate_prob: 0.03,
        }
    }

    /// Units at the edge of range
    pub fn hostile() -> Self {
        ChaosConfig {
            loss_rate: 0.30,
            send_failure_rate: 0.15,
            reorder_prob: 0.25,
            reorder_depth: 8,
            duplicate_prob: 0.10,
        }
    }
}

/// One frame on the medium
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub from: MacAddress,
    pub to: MacAddress,
    pub payload: Vec<u8>,
}

/// Medium statistics
#[derive(Clone, Debug, Default)]
pub struct ChaosStats {
    pub frames_sent: u64,
    pub frames_delivered: u64,
    pub frames_lost: u64,
    pub send_failures: u64,
    pub frames_reordered: u64,
    pub frames_duplicated: u64,
}

impl ChaosStats {
    pub fn loss_rate(&self) -> f64 {
        if self.frames_sent == 0 {
            0.0
        } else {
            (self.frames_lost + self.send_failures) as f64 / self.frames_sent as f64
        }
    }
}

struct Medium {
    config: ChaosConfig,
    rng: StdRng,
    in_flight: VecDeque<Frame>,
    stats: ChaosStats,
}

impl Medium {
    fn transmit(&mut self, frame: Frame) -> SendOutcome {
        self.stats.frames_sent += 1;

        if self.rng.gen::<f64>() < self.config.send_failure_rate {
            self.stats.send_failures += 1;
            return SendOutcome::Failure;
        }
        if self.rng.gen::<f64>() < self.config.loss_rate {
            self.stats.frames_lost += 1;
            return SendOutcome::Success;
        }

        if self.rng.gen::<f64>() < self.config.duplicate_prob {
            self.in_flight.push_back(frame.clone());
            self.stats.frames_duplicated += 1;
        }

        if self.config.reorder_depth > 0
            && !self.in_flight.is_empty()
            && self.rng.gen::<f64>() < self.config.reorder_prob
        {
            let depth = self.config.reorder_depth.min(self.in_flight.len());
            let back = self.rng.gen_range(1..=depth);
            let at = self.in_flight.len() - back;
            self.in_flight.insert(at, frame);
            self.stats.frames_reordered += 1;
        } else {
            self.in_flight.push_back(frame);
        }
        SendOutcome::Success
    }
}

/// Shared chaotic medium between the hub and simulated units
///
/// Implements `Transport` for the hub's side; units put frames on the air
/// with `send_from_unit`.
pub struct ChaosLink {
    hub_address: MacAddress,
    peers: Mutex<HashSet<MacAddress>>,
    max_peers: usize,
    medium: Mutex<Medium>,
}

impl ChaosLink {
    pub fn new(hub_address: MacAddress, config: ChaosConfig, seed: u64) -> Self {
        ChaosLink {
            hub_address,
            peers: Mutex::new(HashSet::new()),
            max_peers: usize::MAX,
            medium: Mutex::new(Medium {
                config,
                rng: StdRng::seed_from_u64(seed),
                in_flight: VecDeque::new(),
                stats: ChaosStats::default(),
            }),
        }
    }

    pub fn with_max_peers(mut self, max_peers: usize) -> Self {
        self.max_peers = max_peers;
        self
    }

    pub fn hub_address(&self) -> MacAddress {
        self.hub_address
    }

    /// Replace the impairment settings, e.g. to let a run settle
    pub fn set_config(&self, config: ChaosConfig) {
        self.medium.lock().config = config;
    }

    /// A unit transmits towards the hub
    pub fn send_from_unit(&self, from: MacAddress, payload: Vec<u8>) -> SendOutcome {
        self.medium.lock().transmit(Frame {
            from,
            to: self.hub_address,
            payload,
        })
    }

    /// Take every frame currently on the air, in delivery order
    pub fn drain(&self) -> Vec<Frame> {
        let mut medium = self.medium.lock();
        let frames: Vec<Frame> = medium.in_flight.drain(..).collect();
        medium.stats.frames_delivered += frames.len() as u64;
        frames
    }

    pub fn stats(&self) -> ChaosStats {
        self.medium.lock().stats.clone()
    }
}

impl Transport for ChaosLink {
    fn add_peer(&self, address: MacAddress) -> HubResult<()> {
        let mut peers = self.peers.lock();
        if peers.contains(&address) {
            return Ok(());
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
        if !self.peers.lock().contains(&address) {
            return SendOutcome::Failure;
        }
        self.medium.lock().transmit(Frame {
            from: self.hub_address,
            to: address,
            payload: payload.to_vec(),
        })
    }
}
