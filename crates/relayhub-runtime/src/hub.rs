//! Hub - the control loop
//!
//! Ties the scheduler to a periodic tick and the link's receive side to the
//! synchronizer. The receive loop only forwards messages over a channel;
//! this loop is their single consumer, and every state change still goes
//! through the synchronizer's lock.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use relayhub_core::{ActionId, HubResult, MacAddress, NodeId, RelayIndex};
use relayhub_state::{
    Actuator, CommandOutcome, NodeSnapshot, RestoreReport, ScheduledAction, Scheduler,
    StateSynchronizer,
};
use relayhub_store::{LogEntry, Store};
use relayhub_time::Clock;
use relayhub_transport::{Inbound, InboundReceiver, Transport};
use tokio::time::MissedTickBehavior;

use crate::HubConfig;

/// Control loop counters
#[derive(Clone, Debug, Default)]
pub struct HubStats {
    pub ticks: u64,
    pub actions_fired: u64,
    pub commands: u64,
    pub inbound_messages: u64,
    pub inbound_dropped: u64,
    pub last_tick_duration: Duration,
}

/// The hub runtime
pub struct Hub {
    tick_interval: Duration,
    sync: Arc<StateSynchronizer>,
    scheduler: Mutex<Scheduler>,
    stats: Mutex<HubStats>,
}

impl Hub {
    pub fn new(
        config: &HubConfig,
        transport: Arc<dyn Transport>,
        actuator: Arc<dyn Actuator>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sync = StateSynchronizer::new(config.sync_config(), transport, actuator, store, clock);
        Hub {
            tick_interval: config.tick_interval,
            sync: Arc::new(sync),
            scheduler: Mutex::new(Scheduler::new(config.scheduler_config())),
            stats: Mutex::new(HubStats::default()),
        }
    }

    /// Restore persisted peers and state
    pub fn start(&self) -> RestoreReport {
        self.sync.restore()
    }

    pub fn synchronizer(&self) -> &Arc<StateSynchronizer> {
        &self.sync
    }

    /// Issue a command for any node/relay
    pub fn command(&self, node: NodeId, relay: RelayIndex, on: bool) -> HubResult<CommandOutcome> {
        let outcome = self.sync.command(node, relay, on)?;
        self.stats.lock().commands += 1;
        Ok(outcome)
    }

    pub fn toggle(&self, node: NodeId, relay: RelayIndex) -> HubResult<CommandOutcome> {
        let outcome = self.sync.toggle(node, relay)?;
        self.stats.lock().commands += 1;
        Ok(outcome)
    }

    /// Register a remote unit by address and name
    pub fn register_peer(&self, address: MacAddress, name: &str) -> HubResult<NodeId> {
        Ok(self.sync.register(address, name)?.id())
    }

    /// Rename a remote unit; the local name comes from config
    pub fn rename_node(&self, node: NodeId, name: &str) -> HubResult<bool> {
        self.sync.rename(node, name)
    }

    /// Queue a relay action `delay` from now
    pub fn schedule(
        &self,
        node: NodeId,
        relay: RelayIndex,
        on: bool,
        delay: Duration,
    ) -> HubResult<ActionId> {
        self.sync.ensure_known(node)?;
        let now = self.sync.clock().mono_now();
        self.scheduler.lock().enqueue(now, node, relay, on, delay)
    }

    pub fn cancel(&self, id: ActionId) -> HubResult<ScheduledAction> {
        self.scheduler.lock().cancel(id)
    }

    /// Every node with its current relay vector, local first
    pub fn nodes(&self) -> Vec<NodeSnapshot> {
        self.sync.all_nodes()
    }

    pub fn recent_log(&self, n: usize) -> HubResult<Vec<LogEntry>> {
        self.sync.recent_log(n)
    }

    pub fn pending_actions(&self) -> Vec<ScheduledAction> {
        self.scheduler.lock().pending()
    }

    pub fn recently_fired(&self) -> Vec<ScheduledAction> {
        self.scheduler.lock().recently_fired()
    }

    pub fn stats(&self) -> HubStats {
        self.stats.lock().clone()
    }

    /// Evaluate the scheduler once; returns how many actions fired
    pub fn tick(&self) -> usize {
        let start = Instant::now();
        let now = self.sync.clock().mono_now();
        let fired = self.scheduler.lock().tick(now, &self.sync);

        let mut stats = self.stats.lock();
        stats.ticks += 1;
        stats.actions_fired += fired as u64;
        stats.last_tick_duration = start.elapsed();
        fired
    }

    /// Apply one message from the receive side
    pub fn handle_inbound(&self, inbound: Inbound) {
        let result = self.sync.handle_inbound(inbound.from, &inbound.payload);

        let mut stats = self.stats.lock();
        stats.inbound_messages += 1;
        match result {
            Ok(Some(outcome)) => {
                tracing::debug!(
                    "status from {}: {} channel(s) changed",
                    inbound.from,
                    outcome.changed.len()
                );
            }
            Ok(None) => stats.inbound_dropped += 1,
            Err(e) => {
                tracing::debug!("inbound from {} dropped: {}", inbound.from, e);
                stats.inbound_dropped += 1;
            }
        }
    }

    /// Run until `shutdown` resolves
    ///
    /// Ticks the scheduler every `tick_interval` and drains `inbound`. If
    /// the inbound side closes, ticking continues.
    pub async fn run<F>(&self, mut inbound: InboundReceiver, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!("control loop started (tick every {:?})", self.tick_interval);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    self.tick();
                }
                Some(message) = inbound.recv() => {
                    self.handle_inbound(message);
                }
            }
        }
        tracing::info!("control loop stopped");
    }
}
