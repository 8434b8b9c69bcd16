//! Hub simulator - one hub and a set of remote units over a chaos link

use std::sync::Arc;
use std::time::Duration;

use relayhub_core::{MacAddress, NodeId, RelayIndex, RelayStates, WallTime};
use relayhub_runtime::{Hub, HubConfig, LoggingActuator};
use relayhub_store::MemoryStore;
use relayhub_time::ManualClock;
use relayhub_transport::Inbound;
use relayhub_wire::Message;

use crate::chaos::{ChaosConfig, ChaosLink};

/// Rounds of delivery per pump before giving up on a chatty medium
const MAX_PUMP_ROUNDS: usize = 16;

/// A remote relay unit
///
/// Applies commands addressed to it and answers each one with its full
/// status, the way the real firmware does.
#[derive(Clone, Debug)]
pub struct SimulatedUnit {
    pub address: MacAddress,
    relays: RelayStates,
    commands_applied: u64,
}

impl SimulatedUnit {
    pub fn new(address: MacAddress) -> Self {
        SimulatedUnit {
            address,
            relays: RelayStates::ALL_OFF,
            commands_applied: 0,
        }
    }

    /// The unit's true relay vector
    pub fn relays(&self) -> RelayStates {
        self.relays
    }

    pub fn commands_applied(&self) -> u64 {
        self.commands_applied
    }

    pub fn status_payload(&self) -> Vec<u8> {
        Message::status(self.relays).encode().to_vec()
    }

    /// Handle one received payload; returns the reply to transmit
    pub fn receive(&mut self, payload: &[u8]) -> Option<Vec<u8>> {
        match Message::decode(payload) {
            Ok(Message::Command { relay, on }) => {
                self.relays.set(relay, on);
                self.commands_applied += 1;
                Some(self.status_payload())
            }
            _ => None,
        }
    }

    /// Flip a relay from the unit's own button
    pub fn press(&mut self, relay: RelayIndex) {
        let on = !self.relays.get(relay);
        self.relays.set(relay, on);
    }
}

/// Address of simulated unit `index`
pub fn unit_address(index: usize) -> MacAddress {
    MacAddress::new([0x02, 0x52, 0x48, 0x00, (index >> 8) as u8, index as u8])
}

/// A hub wired to simulated units through a chaos link
pub struct HubSimulator {
    hub: Hub,
    link: Arc<ChaosLink>,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    actuator: Arc<LoggingActuator>,
    units: Vec<SimulatedUnit>,
}

impl HubSimulator {
    /// Hub with default config and `unit_count` registered units
    pub fn new(unit_count: usize, chaos: ChaosConfig, seed: u64) -> Self {
        Self::with_config(HubConfig::default(), unit_count, chaos, seed)
    }

    pub fn with_config(config: HubConfig, unit_count: usize, chaos: ChaosConfig, seed: u64) -> Self {
        let hub_address = config.own_address;
        let link = Arc::new(ChaosLink::new(hub_address, chaos, seed));
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(WallTime::from_secs(1_700_000_000)));
        let actuator = Arc::new(LoggingActuator::new());

        let hub = Hub::new(
            &config,
            link.clone(),
            actuator.clone(),
            store.clone(),
            clock.clone(),
        );

        let mut units = Vec::with_capacity(unit_count);
        for i in 0..unit_count {
            let unit = SimulatedUnit::new(unit_address(i));
            if let Err(e) = hub.register_peer(unit.address, &format!("Unit {}", i)) {
                tracing::warn!("simulated unit {} not registered: {}", i, e);
            }
            units.push(unit);
        }

        HubSimulator {
            hub,
            link,
            store,
            clock,
            actuator,
            units,
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn link(&self) -> &ChaosLink {
        &self.link
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn actuator(&self) -> &LoggingActuator {
        &self.actuator
    }

    pub fn units(&self) -> &[SimulatedUnit] {
        &self.units
    }

    pub fn unit_mut(&mut self, index: usize) -> &mut SimulatedUnit {
        &mut self.units[index]
    }

    /// Deliver frames until the medium is quiet
    pub fn pump(&mut self) {
        for _ in 0..MAX_PUMP_ROUNDS {
            let frames = self.link.drain();
            if frames.is_empty() {
                return;
            }

            for frame in frames {
                if frame.to == self.link.hub_address() {
                    self.hub.handle_inbound(Inbound::new(frame.from, frame.payload));
                    continue;
                }
                let Some(unit) = self.units.iter_mut().find(|u| u.address == frame.to) else {
                    continue;
                };
                if let Some(reply) = unit.receive(&frame.payload) {
                    self.link.send_from_unit(unit.address, reply);
                }
            }
        }
    }

    /// Advance time, tick the hub and deliver what that produced
    pub fn step(&mut self, dt: Duration) {
        self.clock.advance(dt);
        self.hub.tick();
        self.pump();
    }

    /// Every unit sends a status report
    pub fn heartbeat(&mut self) {
        for unit in &self.units {
            self.link.send_from_unit(unit.address, unit.status_payload());
        }
        self.pump();
    }

    /// Press a unit's own button and have it report
    pub fn press(&mut self, index: usize, relay: RelayIndex) {
        let unit = &mut self.units[index];
        unit.press(relay);
        self.link.send_from_unit(unit.address, unit.status_payload());
    }

    /// Whether the hub's view of every unit matches the unit itself
    pub fn converged(&self) -> bool {
        self.divergent_units().is_empty()
    }

    /// Units whose hub-side vector differs from their true one
    pub fn divergent_units(&self) -> Vec<usize> {
        let nodes = self.hub.nodes();
        self.units
            .iter()
            .enumerate()
            .filter(|(i, unit)| {
                let id = NodeId::remote(*i);
                nodes
                    .iter()
                    .find(|n| n.id == id)
                    .map_or(true, |n| n.relays != unit.relays())
            })
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay(i: u8) -> RelayIndex {
        RelayIndex::new(i).unwrap()
    }

    #[test]
    fn test_unit_applies_command_and_reports() {
        let mut unit = SimulatedUnit::new(unit_address(0));
        let reply = unit.receive(&[0x01, 2, 1]).unwrap();

        assert!(unit.relays().get(relay(2)));
        assert_eq!(reply, vec![0x02, 0, 0, 1, 0, 0]);
        assert!(unit.receive(&[0x02, 1, 1, 1, 1, 0]).is_none());
        assert!(unit.receive(&[0x09]).is_none());
    }

    #[test]
    fn test_perfect_link_command_round_trip() {
        let mut sim = HubSimulator::new(2, ChaosConfig::perfect(), 1);
        sim.hub().command(NodeId::Remote(1), relay(0), true).unwrap();
        sim.pump();

        assert!(sim.units()[1].relays().get(relay(0)));
        assert!(sim.converged());
        // Command plus the confirming report: one transition logged
        assert_eq!(sim.store().log_len(), 1);
        assert!(sim.hub().nodes()[2].active);
    }

    #[test]
    fn test_button_press_reaches_hub() {
        let mut sim = HubSimulator::new(1, ChaosConfig::perfect(), 1);
        sim.press(0, relay(3));
        sim.pump();

        assert!(sim.hub().nodes()[1].relays.get(relay(3)));
        assert_eq!(sim.store().log_len(), 1);
    }

    #[test]
    fn test_addresses_are_distinct() {
        assert_ne!(unit_address(0), unit_address(1));
        assert_ne!(unit_address(1), unit_address(257));
    }
}
