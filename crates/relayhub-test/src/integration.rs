//! End-to-end scenarios
//!
//! Drives a hub and its units through command, report and schedule
//! traffic over an impaired link, then checks the properties the hub must
//! keep no matter what the link did:
//! - once reports flow again, the hub's view matches every unit
//! - no log entry repeats the state of the previous entry for its channel
//! - memory and the saved snapshot agree

use std::collections::HashMap;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use relayhub_core::{NodeId, RelayIndex, RELAY_CHANNELS};
use relayhub_store::LogEntry;

use crate::chaos::ChaosConfig;
use crate::simulator::HubSimulator;

/// Scenario parameters
#[derive(Clone, Debug)]
pub struct ScenarioConfig {
    pub units: usize,
    pub commands: usize,
    pub chaos: ChaosConfig,
    pub seed: u64,
}

impl ScenarioConfig {
    pub fn minimal() -> Self {
        ScenarioConfig {
            units: 2,
            commands: 20,
            chaos: ChaosConfig::perfect(),
            seed: 1,
        }
    }

    pub fn standard() -> Self {
        ScenarioConfig {
            units: 5,
            commands: 200,
            chaos: ChaosConfig::poor(),
            seed: 42,
        }
    }

    pub fn stress() -> Self {
        ScenarioConfig {
            units: 20,
            commands: 1000,
            chaos: ChaosConfig::hostile(),
            seed: 7,
        }
    }
}

/// What a scenario observed
#[derive(Clone, Debug, Default)]
pub struct ScenarioResult {
    pub converged_before_settle: bool,
    pub converged: bool,
    pub log_entries: usize,
    pub violations: Vec<String>,
}

impl ScenarioResult {
    pub fn passed(&self) -> bool {
        self.converged && self.violations.is_empty()
    }
}

/// Random commands and button presses over the configured link, followed
/// by a lossless heartbeat round
pub fn run_scenario(config: &ScenarioConfig) -> ScenarioResult {
    let mut sim = HubSimulator::new(config.units, config.chaos.clone(), config.seed);
    let mut rng = StdRng::seed_from_u64(config.seed ^ 0x5eed);

    for _ in 0..config.commands {
        let unit = rng.gen_range(0..config.units);
        let relay = random_relay(&mut rng);

        if rng.gen_bool(0.2) {
            sim.press(unit, relay);
        } else {
            let on = rng.gen_bool(0.5);
            if let Err(e) = sim.hub().command(NodeId::remote(unit), relay, on) {
                tracing::warn!("scenario command failed: {}", e);
            }
        }
        sim.step(Duration::from_secs(rng.gen_range(1..30)));
    }

    let converged_before_settle = sim.converged();

    // Reports always win eventually
    sim.link().set_config(ChaosConfig::perfect());
    sim.heartbeat();

    let mut result = ScenarioResult {
        converged_before_settle,
        converged: sim.converged(),
        log_entries: sim.store().log_len(),
        violations: Vec::new(),
    };
    check_log(&sim.store().log(), &mut result.violations);
    check_snapshot(&sim, &mut result.violations);
    result
}

fn random_relay(rng: &mut StdRng) -> RelayIndex {
    let relays: Vec<RelayIndex> = RelayIndex::all().collect();
    relays[rng.gen_range(0..RELAY_CHANNELS)]
}

/// Each entry must flip its channel's previous entry
pub fn check_log(log: &[LogEntry], violations: &mut Vec<String>) {
    let mut last: HashMap<(NodeId, RelayIndex), bool> = HashMap::new();
    for (i, entry) in log.iter().enumerate() {
        if let Some(&previous) = last.get(&(entry.node, entry.relay)) {
            if previous == entry.on {
                violations.push(format!(
                    "log entry {} repeats state {} for node {} relay {}",
                    i, entry.on, entry.node, entry.relay
                ));
            }
        }
        last.insert((entry.node, entry.relay), entry.on);
    }
}

fn check_snapshot(sim: &HubSimulator, violations: &mut Vec<String>) {
    let saved = sim.store().snapshot();
    for node in sim.hub().nodes() {
        let row = saved.iter().find(|r| r.node == node.id);
        match row {
            Some(row) if row.relays == node.relays => {}
            // A node that never changed may never have been saved
            None if node.relays.count_on() == 0 => {}
            _ => violations.push(format!("snapshot disagrees with memory for node {}", node.id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use proptest::prelude::*;
    use relayhub_core::{MacAddress, RelayStates, WallTime};
    use relayhub_runtime::{Hub, HubConfig, LoggingActuator};
    use relayhub_store::FileStore;
    use relayhub_time::{Clock, ManualClock};
    use tempfile::TempDir;

    fn relay(i: u8) -> RelayIndex {
        RelayIndex::new(i).unwrap()
    }

    fn kitchen() -> MacAddress {
        "AA:BB:CC:DD:EE:FF".parse().unwrap()
    }

    #[test]
    fn test_minimal_scenario() {
        let result = run_scenario(&ScenarioConfig::minimal());
        assert!(result.converged_before_settle);
        assert!(result.passed(), "{:?}", result.violations);
        assert!(result.log_entries > 0);
    }

    #[test]
    fn test_scenario_with_poor_link() {
        let result = run_scenario(&ScenarioConfig::standard());
        assert!(result.passed(), "{:?}", result.violations);
    }

    #[test]
    fn test_scenario_under_stress() {
        let result = run_scenario(&ScenarioConfig::stress());
        assert!(result.passed(), "{:?}", result.violations);
    }

    #[test]
    fn test_lost_command_corrected_by_next_report() {
        let mut sim = HubSimulator::new(1, ChaosConfig::perfect(), 3);
        sim.link().set_config(ChaosConfig {
            loss_rate: 1.0,
            ..ChaosConfig::perfect()
        });

        let outcome = sim.hub().command(NodeId::Remote(0), relay(1), true).unwrap();
        assert!(outcome.changed);
        sim.pump();

        // Optimistic view is wrong until the unit reports
        assert!(sim.hub().nodes()[1].relays.get(relay(1)));
        assert!(!sim.units()[0].relays().get(relay(1)));

        sim.link().set_config(ChaosConfig::perfect());
        sim.clock().advance(Duration::from_secs(45));
        sim.heartbeat();

        assert!(sim.converged());
        let log = sim.store().log();
        assert_eq!(log.len(), 2);
        assert!(!log[1].on);
        assert_eq!(log[1].duration(), Duration::from_secs(45));
    }

    #[test]
    fn test_scheduled_command_reaches_unit() {
        let mut sim = HubSimulator::new(1, ChaosConfig::perfect(), 5);
        sim.hub()
            .schedule(NodeId::Remote(0), relay(2), true, Duration::from_secs(90))
            .unwrap();

        sim.step(Duration::from_secs(60));
        assert!(!sim.units()[0].relays().get(relay(2)));

        sim.step(Duration::from_secs(30));
        assert!(sim.units()[0].relays().get(relay(2)));
        assert_eq!(sim.units()[0].commands_applied(), 1);
        assert!(sim.hub().pending_actions().is_empty());
    }

    #[test]
    fn test_duplicate_reports_log_once() {
        let mut sim = HubSimulator::new(1, ChaosConfig::perfect(), 9);
        sim.unit_mut(0).press(relay(0));
        for _ in 0..5 {
            sim.heartbeat();
        }
        assert_eq!(sim.store().log_len(), 1);
    }

    #[test]
    fn test_capacity_limits() {
        let config = HubConfig {
            max_nodes: 2,
            max_scheduled: 1,
            ..Default::default()
        };
        let sim = HubSimulator::with_config(config, 3, ChaosConfig::perfect(), 11);
        assert_eq!(sim.hub().nodes().len(), 3);

        sim.hub()
            .schedule(NodeId::Local, relay(0), true, Duration::from_secs(60))
            .unwrap();
        assert!(sim
            .hub()
            .schedule(NodeId::Local, relay(1), true, Duration::from_secs(60))
            .is_err());
        assert_eq!(sim.hub().pending_actions().len(), 1);
    }

    #[test]
    fn test_durations_survive_restart() {
        let temp_dir = TempDir::new().unwrap();
        let config = HubConfig {
            data_dir: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        let clock = Arc::new(ManualClock::new(WallTime::from_secs(1_000)));

        let start_hub = |clock: Arc<ManualClock>| {
            let link = Arc::new(crate::chaos::ChaosLink::new(
                config.own_address,
                ChaosConfig::perfect(),
                1,
            ));
            let hub = Hub::new(
                &config,
                link,
                Arc::new(LoggingActuator::new()),
                Arc::new(FileStore::open(&config.data_dir).unwrap()),
                clock,
            );
            hub.start();
            hub
        };

        {
            let hub = start_hub(clock.clone());
            let id = hub.register_peer(kitchen(), "Kitchen").unwrap();
            hub.command(id, relay(1), true).unwrap();
            hub.command(NodeId::Local, relay(0), true).unwrap();
        }

        clock.advance(Duration::from_secs(150));
        let hub = start_hub(clock.clone());

        let nodes = hub.nodes();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].name, "Kitchen");
        assert_eq!(nodes[1].relays, RelayStates::new([false, true, false, false]));
        assert!(nodes[0].relays.get(relay(0)));

        let outcome = hub.command(NodeId::Remote(0), relay(1), false).unwrap();
        assert!(outcome.changed);
        let latest = &hub.recent_log(1).unwrap()[0];
        assert_eq!(latest.timestamp, clock.wall_now());
        assert_eq!(latest.duration(), Duration::from_secs(150));
    }

    #[test]
    fn test_check_log_flags_repeats() {
        let entry = |on| LogEntry {
            timestamp: WallTime::from_secs(0),
            node: NodeId::Local,
            node_name: "Hub".into(),
            relay: relay(0),
            on,
            duration_secs: 0,
        };
        let mut violations = Vec::new();
        check_log(&[entry(true), entry(false), entry(false)], &mut violations);
        assert_eq!(violations.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_arbitrary_inbound_keeps_log_consistent(
            frames in proptest::collection::vec(
                (0usize..3, proptest::collection::vec(any::<u8>(), 0..8)),
                0..64,
            )
        ) {
            let mut sim = HubSimulator::new(3, ChaosConfig::perfect(), 13);
            for (unit, payload) in frames {
                let address = sim.units()[unit].address;
                sim.link().send_from_unit(address, payload);
            }
            sim.pump();

            let mut violations = Vec::new();
            check_log(&sim.store().log(), &mut violations);
            prop_assert!(violations.is_empty(), "{:?}", violations);
            prop_assert_eq!(sim.hub().nodes().len(), 4);
        }
    }
}
