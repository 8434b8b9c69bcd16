//! State synchronizer - the single entry point for relay state changes
//!
//! Commands (panel, API, scheduler) and status reports (receive path) both
//! land here. Every mutation of the directory, together with its log
//! append and snapshot write, happens under one lock, so concurrent
//! callers never interleave a read-modify-write on a channel and memory
//! never diverges from what was persisted.
//!
//! Remote commands are optimistic. The link only says whether a frame left,
//! never whether the unit acted on it, so the hub applies the new state as
//! soon as the command is sent and does NOT roll it back on a send failure.
//! A wrong optimistic value stays until the unit's next status report
//! corrects it through `reconcile`.

use std::sync::Arc;

use parking_lot::Mutex;
use relayhub_core::{HubError, HubResult, MacAddress, NodeId, RelayIndex, RelayStates, WallTime};
use relayhub_store::{LogEntry, Store};
use relayhub_time::Clock;
use relayhub_transport::Transport;
use relayhub_wire::Message;

use crate::{
    EventLog, NodeSnapshot, PeerDirectory, Registration, DEFAULT_LOG_SCAN_DEPTH,
    DEFAULT_MAX_NODES,
};

/// Direct write to the local relay bank
pub trait Actuator: Send + Sync {
    /// Drive one local relay line; always succeeds from the core's view
    fn set_local_relay(&self, relay: RelayIndex, on: bool);
}

/// How a command reached its target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the local actuator
    Local,
    /// Frame left the link
    Sent,
    /// Link reported failure; the optimistic state was kept anyway
    SendFailed,
}

/// Result of a command
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutcome {
    pub node: NodeId,
    pub relay: RelayIndex,
    pub on: bool,
    /// Whether the hub's view of the channel changed
    pub changed: bool,
    pub delivery: Delivery,
    /// False if a log or snapshot write failed
    pub persisted: bool,
}

/// Result of applying a status report
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub node: NodeId,
    /// The reporting unit was unknown and got auto-registered
    pub registered: bool,
    /// Channels whose value changed
    pub changed: Vec<RelayIndex>,
    pub persisted: bool,
}

/// What a startup restore found
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub peers_restored: usize,
    pub peers_failed: usize,
    pub rows_restored: usize,
}

/// Synchronizer settings
#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub local_name: String,
    pub max_nodes: usize,
    pub log_scan_depth: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            local_name: "Hub".into(),
            max_nodes: DEFAULT_MAX_NODES,
            log_scan_depth: DEFAULT_LOG_SCAN_DEPTH,
        }
    }
}

/// State guarded by the synchronizer lock
struct Shared {
    directory: PeerDirectory,
    log: EventLog,
}

/// Orchestrates commands, optimistic updates and reconciliation
pub struct StateSynchronizer {
    shared: Mutex<Shared>,
    transport: Arc<dyn Transport>,
    actuator: Arc<dyn Actuator>,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl StateSynchronizer {
    pub fn new(
        config: SyncConfig,
        transport: Arc<dyn Transport>,
        actuator: Arc<dyn Actuator>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let shared = Shared {
            directory: PeerDirectory::new(config.local_name, config.max_nodes),
            log: EventLog::new(store.clone(), config.log_scan_depth),
        };
        StateSynchronizer {
            shared: Mutex::new(shared),
            transport,
            actuator,
            store,
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Reload peers and relay vectors saved by a previous run
    ///
    /// Peers are re-registered in stored order so ids come back the same.
    /// Restored vectors produce no log entries; the local bank is driven to
    /// its restored vector.
    pub fn restore(&self) -> RestoreReport {
        let mut shared = self.shared.lock();
        let mut report = RestoreReport::default();

        let peers = self.store.load_directory().unwrap_or_else(|e| {
            tracing::warn!("peer directory unreadable, starting empty: {}", e);
            Vec::new()
        });
        for peer in &peers {
            match shared
                .directory
                .register(peer.address, &peer.name, self.transport.as_ref())
            {
                Ok(_) => report.peers_restored += 1,
                Err(e) => {
                    tracing::warn!("could not restore peer {} ({}): {}", peer.name, peer.address, e);
                    report.peers_failed += 1;
                }
            }
        }

        let snapshot = self.store.load_snapshot().unwrap_or_else(|e| {
            tracing::warn!("state snapshot unreadable, starting all off: {}", e);
            Vec::new()
        });
        report.rows_restored = shared.directory.restore_state(&snapshot);

        if let Ok(local) = shared.directory.get_state(NodeId::Local) {
            for (relay, on) in local.iter() {
                self.actuator.set_local_relay(relay, on);
            }
        }

        tracing::info!(
            "restored {} peers ({} failed), {} state rows",
            report.peers_restored,
            report.peers_failed,
            report.rows_restored
        );
        report
    }

    /// Register a remote unit and persist the directory
    pub fn register(&self, address: MacAddress, name: &str) -> HubResult<Registration> {
        let mut shared = self.shared.lock();
        let registration = shared
            .directory
            .register(address, name, self.transport.as_ref())?;

        if registration.is_new() {
            tracing::info!("registered {} as node {}", address, registration.id());
        }
        if registration.changed_directory() {
            self.persist_directory(&shared);
        }
        Ok(registration)
    }

    /// Set one relay on any node
    ///
    /// Local: writes the actuator, then records the change. Remote: sends
    /// the command, then records the change whether or not the send
    /// succeeded (see the module docs).
    pub fn command(&self, node: NodeId, relay: RelayIndex, on: bool) -> HubResult<CommandOutcome> {
        let mut shared = self.shared.lock();
        self.command_locked(&mut shared, node, relay, on)
    }

    /// Flip one relay from its current value
    pub fn toggle(&self, node: NodeId, relay: RelayIndex) -> HubResult<CommandOutcome> {
        let mut shared = self.shared.lock();
        let current = shared.directory.get_state(node)?.get(relay);
        self.command_locked(&mut shared, node, relay, !current)
    }

    fn command_locked(
        &self,
        shared: &mut Shared,
        node: NodeId,
        relay: RelayIndex,
        on: bool,
    ) -> HubResult<CommandOutcome> {
        // Validate before touching hardware or the link
        let address = shared.directory.address(node)?;

        let delivery = match address {
            None => {
                self.actuator.set_local_relay(relay, on);
                Delivery::Local
            }
            Some(address) => {
                let frame = Message::command(relay, on).encode();
                if self.transport.send(address, &frame).is_success() {
                    Delivery::Sent
                } else {
                    tracing::warn!(
                        "command to {} ({}) relay {} not sent; keeping optimistic state",
                        node,
                        address,
                        relay
                    );
                    Delivery::SendFailed
                }
            }
        };

        let now = self.clock.wall_now();
        let changed = shared.directory.set_state(node, relay, on)?;
        let persisted = if changed {
            let logged = self.record_transition(shared, now, node, relay, on);
            let saved = self.persist_snapshot(shared);
            logged && saved
        } else {
            tracing::debug!("node {} relay {} already {}", node, relay, on);
            true
        };

        Ok(CommandOutcome {
            node,
            relay,
            on,
            changed,
            delivery,
            persisted,
        })
    }

    /// Apply a unit's reported relay vector
    ///
    /// Only channels that differ are written and logged, so a repeated
    /// report is free. Marks the node active.
    pub fn reconcile(&self, node: NodeId, reported: RelayStates) -> HubResult<ReconcileOutcome> {
        let mut shared = self.shared.lock();
        self.reconcile_locked(&mut shared, node, reported, false)
    }

    /// Apply a status report by sender address, registering unknown senders
    /// under a generated name first
    pub fn handle_status(
        &self,
        address: MacAddress,
        reported: RelayStates,
    ) -> HubResult<ReconcileOutcome> {
        let mut shared = self.shared.lock();

        let (node, registered) = match shared.directory.find_by_address(address) {
            Some(node) => (node, false),
            None => {
                let node = shared
                    .directory
                    .register(address, "", self.transport.as_ref())?
                    .id();
                tracing::info!("auto-registered {} as node {}", address, node);
                self.persist_directory(&shared);
                (node, true)
            }
        };

        self.reconcile_locked(&mut shared, node, reported, registered)
    }

    fn reconcile_locked(
        &self,
        shared: &mut Shared,
        node: NodeId,
        reported: RelayStates,
        registered: bool,
    ) -> HubResult<ReconcileOutcome> {
        let current = shared.directory.get_state(node)?;
        let now = self.clock.wall_now();
        shared.directory.mark_seen(node, now)?;

        let changed = current.diff(&reported);
        let mut persisted = true;
        for &relay in &changed {
            let on = reported.get(relay);
            shared.directory.set_state(node, relay, on)?;
            persisted &= self.record_transition(shared, now, node, relay, on);
        }
        if !changed.is_empty() {
            persisted &= self.persist_snapshot(shared);
        }

        Ok(ReconcileOutcome {
            node,
            registered,
            changed,
            persisted,
        })
    }

    /// Decode and dispatch one inbound payload
    ///
    /// Returns `Ok(None)` for messages the hub does not act on. Undecodable
    /// payloads are returned as errors for the caller to drop.
    pub fn handle_inbound(
        &self,
        address: MacAddress,
        payload: &[u8],
    ) -> HubResult<Option<ReconcileOutcome>> {
        match Message::decode(payload) {
            Ok(Message::Status { relays }) => self.handle_status(address, relays).map(Some),
            Ok(Message::Command { relay, on }) => {
                tracing::warn!(
                    "ignoring command from {} (relay {} -> {}): hub is not a command target",
                    address,
                    relay,
                    on
                );
                Ok(None)
            }
            Err(e) => {
                tracing::warn!("dropping payload from {}: {}", address, e);
                Err(e)
            }
        }
    }

    /// Change a remote unit's display name and persist the directory
    ///
    /// The local node is named by configuration and cannot be renamed here.
    pub fn rename(&self, node: NodeId, name: &str) -> HubResult<bool> {
        if node.is_local() {
            return Err(HubError::Config(
                "the local node's name is set by local_name".into(),
            ));
        }
        let mut shared = self.shared.lock();
        let changed = shared.directory.rename(node, name)?;
        if changed {
            self.persist_directory(&shared);
        }
        Ok(changed)
    }

    pub fn get_state(&self, node: NodeId) -> HubResult<RelayStates> {
        self.shared.lock().directory.get_state(node)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.shared.lock().directory.contains(node)
    }

    /// Fail with `UnknownNode` unless the directory holds `node`
    pub fn ensure_known(&self, node: NodeId) -> HubResult<()> {
        if self.contains(node) {
            Ok(())
        } else {
            Err(HubError::UnknownNode(node))
        }
    }

    pub fn find_by_address(&self, address: MacAddress) -> Option<NodeId> {
        self.shared.lock().directory.find_by_address(address)
    }

    /// Every node, local first
    pub fn all_nodes(&self) -> Vec<NodeSnapshot> {
        self.shared.lock().directory.all_nodes()
    }

    /// Up to `n` most recent log entries, newest first
    pub fn recent_log(&self, n: usize) -> HubResult<Vec<LogEntry>> {
        self.shared.lock().log.recent(n)
    }

    /// Append the log entry for one change; false if the store refused it
    fn record_transition(
        &self,
        shared: &Shared,
        now: WallTime,
        node: NodeId,
        relay: RelayIndex,
        on: bool,
    ) -> bool {
        let name = match shared.directory.name(node) {
            Ok(name) => name,
            Err(_) => return false,
        };
        match shared.log.append(now, node, name, relay, on) {
            Ok(entry) => {
                tracing::info!(
                    "{} relay {} -> {} (was {} for {:?})",
                    entry.node_name,
                    relay,
                    if on { "ON" } else { "OFF" },
                    if on { "OFF" } else { "ON" },
                    entry.duration()
                );
                true
            }
            Err(e) => {
                tracing::warn!("log append failed for {} relay {}: {}", node, relay, e);
                false
            }
        }
    }

    fn persist_snapshot(&self, shared: &Shared) -> bool {
        match self.store.save_snapshot(&shared.directory.snapshot_records()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("snapshot write failed, memory stays authoritative: {}", e);
                false
            }
        }
    }

    fn persist_directory(&self, shared: &Shared) -> bool {
        match self.store.save_directory(&shared.directory.peer_records()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("directory write failed: {}", e);
                false
            }
        }
    }
}

impl std::fmt::Debug for StateSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSynchronizer")
            .field("nodes", &self.shared.lock().directory.len())
            .finish()
    }
}
