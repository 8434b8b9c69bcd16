//! Deferred relay actions
//!
//! A bounded, insertion-ordered queue of actions keyed by monotonic fire
//! time. Due actions run in the order they were enqueued; executed entries
//! linger for a retention window so they can be listed, then are purged.

use std::time::Duration;

use relayhub_core::{ActionId, HubError, HubResult, MonoTime, NodeId, RelayIndex};

use crate::StateSynchronizer;

/// Default queue capacity
pub const DEFAULT_MAX_SCHEDULED: usize = 10;

/// Default shortest accepted delay
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(60);

/// Default longest accepted delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Default time an executed action stays listed
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(5 * 60);

/// Scheduler limits
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Maximum entries, executed-but-retained ones included
    pub max_actions: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// How long an executed action is kept before purge
    pub retention: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            max_actions: DEFAULT_MAX_SCHEDULED,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            retention: DEFAULT_RETENTION,
        }
    }
}

/// One deferred relay action
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduledAction {
    pub id: ActionId,
    pub node: NodeId,
    pub relay: RelayIndex,
    pub on: bool,
    pub fire_at: MonoTime,
    pub executed: bool,
    pub executed_at: Option<MonoTime>,
}

impl ScheduledAction {
    #[inline]
    pub fn is_due(&self, now: MonoTime) -> bool {
        !self.executed && self.fire_at <= now
    }

    /// Time left until it fires, zero once due
    pub fn remaining(&self, now: MonoTime) -> Duration {
        self.fire_at - now
    }

    fn is_expired(&self, now: MonoTime, retention: Duration) -> bool {
        match self.executed_at {
            Some(at) if self.executed => at.saturating_add(retention) <= now,
            _ => false,
        }
    }
}

/// Bounded queue of deferred actions
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    /// Insertion order is the execution tie-break
    actions: Vec<ScheduledAction>,
    next_id: u32,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Scheduler {
            actions: Vec::with_capacity(config.max_actions),
            config,
            next_id: 0,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Queue an action to fire `delay` after `now`
    ///
    /// Rejects before touching the queue if the delay is out of range or
    /// the queue is full.
    pub fn enqueue(
        &mut self,
        now: MonoTime,
        node: NodeId,
        relay: RelayIndex,
        on: bool,
        delay: Duration,
    ) -> HubResult<ActionId> {
        if delay < self.config.min_delay || delay > self.config.max_delay {
            return Err(HubError::InvalidDelay {
                requested: delay,
                min: self.config.min_delay,
                max: self.config.max_delay,
            });
        }

        self.purge(now);
        if self.actions.len() >= self.config.max_actions {
            return Err(HubError::CapacityExceeded {
                table: "schedule",
                limit: self.config.max_actions,
            });
        }

        let id = ActionId::new(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.actions.push(ScheduledAction {
            id,
            node,
            relay,
            on,
            fire_at: now.saturating_add(delay),
            executed: false,
            executed_at: None,
        });

        tracing::debug!(
            "scheduled {} for {} relay {} -> {} in {:?}",
            id,
            node,
            relay,
            on,
            delay
        );
        Ok(id)
    }

    /// Remove a pending action
    pub fn cancel(&mut self, id: ActionId) -> HubResult<ScheduledAction> {
        let index = self
            .actions
            .iter()
            .position(|a| a.id == id && !a.executed)
            .ok_or(HubError::UnknownAction(id))?;
        Ok(self.actions.remove(index))
    }

    /// Run every due action through `fire`, in insertion order, marking
    /// each executed exactly once. Expired entries are purged afterwards.
    ///
    /// Returns how many actions fired.
    pub fn fire_due<F>(&mut self, now: MonoTime, mut fire: F) -> usize
    where
        F: FnMut(&ScheduledAction),
    {
        let mut fired = 0;
        for action in self.actions.iter_mut().filter(|a| a.is_due(now)) {
            fire(action);
            action.executed = true;
            action.executed_at = Some(now);
            fired += 1;
        }
        self.purge(now);
        fired
    }

    /// Fire due actions as commands
    ///
    /// A failed command is not retried; the action still counts as executed.
    pub fn tick(&mut self, now: MonoTime, sync: &StateSynchronizer) -> usize {
        self.fire_due(now, |action| {
            match sync.command(action.node, action.relay, action.on) {
                Ok(outcome) => tracing::info!(
                    "scheduled action {} fired: {} relay {} -> {} ({:?})",
                    action.id,
                    action.node,
                    action.relay,
                    action.on,
                    outcome.delivery
                ),
                Err(e) => tracing::warn!("scheduled action {} failed: {}", action.id, e),
            }
        })
    }

    /// Drop executed actions past retention, keeping the rest in order
    pub fn purge(&mut self, now: MonoTime) {
        let retention = self.config.retention;
        self.actions.retain(|a| !a.is_expired(now, retention));
    }

    /// Actions waiting to fire, in insertion order
    pub fn pending(&self) -> Vec<ScheduledAction> {
        self.actions.iter().filter(|a| !a.executed).cloned().collect()
    }

    /// Executed actions still inside the retention window
    pub fn recently_fired(&self) -> Vec<ScheduledAction> {
        self.actions.iter().filter(|a| a.executed).cloned().collect()
    }

    /// Entries held, executed ones included
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    fn relay(i: u8) -> RelayIndex {
        RelayIndex::new(i).unwrap()
    }

    fn at(secs: u64) -> MonoTime {
        MonoTime::from_duration(Duration::from_secs(secs))
    }

    fn collect_fired(scheduler: &mut Scheduler, now: MonoTime) -> Vec<ActionId> {
        let mut fired = Vec::new();
        scheduler.fire_due(now, |a| fired.push(a.id));
        fired
    }

    #[test]
    fn test_enqueue_sets_fire_time() {
        let mut scheduler = Scheduler::default();
        let id = scheduler
            .enqueue(at(10), NodeId::Local, relay(0), true, MINUTE)
            .unwrap();

        let pending = scheduler.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].fire_at, at(70));
        assert_eq!(pending[0].remaining(at(40)), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_delay_rejected() {
        let mut scheduler = Scheduler::default();

        for delay in [Duration::from_secs(59), Duration::from_secs(24 * 3600 + 1)] {
            assert!(matches!(
                scheduler.enqueue(at(0), NodeId::Local, relay(0), true, delay),
                Err(HubError::InvalidDelay { .. })
            ));
        }
        assert!(scheduler.is_empty());

        // Both bounds are inclusive
        scheduler.enqueue(at(0), NodeId::Local, relay(0), true, MINUTE).unwrap();
        scheduler
            .enqueue(at(0), NodeId::Local, relay(0), true, DEFAULT_MAX_DELAY)
            .unwrap();
    }

    #[test]
    fn test_ties_fire_in_insertion_order() {
        let mut scheduler = Scheduler::default();
        let a = scheduler
            .enqueue(at(0), NodeId::Remote(0), relay(1), true, MINUTE)
            .unwrap();
        let b = scheduler
            .enqueue(at(0), NodeId::Remote(0), relay(1), false, MINUTE)
            .unwrap();

        assert_eq!(collect_fired(&mut scheduler, at(60)), vec![a, b]);
    }

    #[test]
    fn test_not_due_does_not_fire() {
        let mut scheduler = Scheduler::default();
        scheduler.enqueue(at(0), NodeId::Local, relay(0), true, MINUTE).unwrap();

        assert!(collect_fired(&mut scheduler, at(59)).is_empty());
        assert_eq!(collect_fired(&mut scheduler, at(60)).len(), 1);
        // Executed exactly once
        assert!(collect_fired(&mut scheduler, at(61)).is_empty());
        assert_eq!(scheduler.recently_fired().len(), 1);
        assert!(scheduler.pending().is_empty());
    }

    #[test]
    fn test_capacity_boundary_leaves_queue_unchanged() {
        let mut scheduler = Scheduler::new(SchedulerConfig {
            max_actions: 2,
            ..Default::default()
        });
        scheduler.enqueue(at(0), NodeId::Local, relay(0), true, MINUTE).unwrap();
        scheduler.enqueue(at(0), NodeId::Local, relay(1), true, MINUTE).unwrap();
        let before = scheduler.pending();

        assert!(matches!(
            scheduler.enqueue(at(0), NodeId::Local, relay(2), true, MINUTE),
            Err(HubError::CapacityExceeded { table: "schedule", limit: 2 })
        ));
        assert_eq!(scheduler.pending(), before);
    }

    #[test]
    fn test_executed_actions_purged_after_retention() {
        let mut scheduler = Scheduler::new(SchedulerConfig {
            max_actions: 1,
            ..Default::default()
        });
        scheduler.enqueue(at(0), NodeId::Local, relay(0), true, MINUTE).unwrap();
        collect_fired(&mut scheduler, at(60));

        // Still retained, so still occupying the only slot
        assert!(scheduler
            .enqueue(at(61), NodeId::Local, relay(0), false, MINUTE)
            .is_err());

        collect_fired(&mut scheduler, at(60 + 300));
        assert!(scheduler.is_empty());
        scheduler
            .enqueue(at(360), NodeId::Local, relay(0), false, MINUTE)
            .unwrap();
    }

    #[test]
    fn test_purge_preserves_order() {
        let mut scheduler = Scheduler::default();
        scheduler.enqueue(at(0), NodeId::Local, relay(0), true, MINUTE).unwrap();
        let b = scheduler
            .enqueue(at(0), NodeId::Local, relay(1), true, 10 * MINUTE)
            .unwrap();
        let c = scheduler
            .enqueue(at(0), NodeId::Local, relay(1), false, 10 * MINUTE)
            .unwrap();
        let d = scheduler
            .enqueue(at(0), NodeId::Local, relay(2), true, 10 * MINUTE)
            .unwrap();

        collect_fired(&mut scheduler, at(60));
        collect_fired(&mut scheduler, at(400));

        let ids: Vec<ActionId> = scheduler.pending().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![b, c, d]);
        assert_eq!(collect_fired(&mut scheduler, at(600)), vec![b, c, d]);
    }

    #[test]
    fn test_cancel() {
        let mut scheduler = Scheduler::default();
        let a = scheduler
            .enqueue(at(0), NodeId::Local, relay(0), true, MINUTE)
            .unwrap();
        let b = scheduler
            .enqueue(at(0), NodeId::Local, relay(1), true, 2 * MINUTE)
            .unwrap();

        assert_eq!(scheduler.cancel(a).unwrap().id, a);
        assert!(matches!(scheduler.cancel(a), Err(HubError::UnknownAction(_))));

        collect_fired(&mut scheduler, at(120));
        // Already executed
        assert!(matches!(scheduler.cancel(b), Err(HubError::UnknownAction(_))));
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_due_actions_fire_in_insertion_order(
                delays in proptest::collection::vec(60u64..600, 1..DEFAULT_MAX_SCHEDULED)
            ) {
                let mut scheduler = Scheduler::default();
                let mut ids = Vec::new();
                for (i, secs) in delays.iter().enumerate() {
                    let on = i % 2 == 0;
                    ids.push(
                        scheduler
                            .enqueue(at(0), NodeId::Local, relay(0), on, Duration::from_secs(*secs))
                            .unwrap(),
                    );
                }

                let fired = collect_fired(&mut scheduler, at(600));
                prop_assert_eq!(fired, ids);
                prop_assert!(scheduler.pending().is_empty());
            }
        }
    }
}
