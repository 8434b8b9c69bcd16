//! Event log - append-only record of relay transitions
//!
//! Each entry carries how long the channel sat in its previous state. That
//! duration is derived from the durable record itself, not from an
//! in-memory index, so it stays consistent across restarts.

use std::sync::Arc;
use std::time::Duration;

use relayhub_core::{HubResult, NodeId, RelayIndex, WallTime};
use relayhub_store::{LogEntry, Store};

/// Default number of trailing records a duration lookup scans
pub const DEFAULT_LOG_SCAN_DEPTH: usize = 500;

/// Time since the most recent entry for the same channel whose state
/// differs from `on`, or zero if `history` holds none.
///
/// `history` is oldest first.
pub fn derive_duration(
    history: &[LogEntry],
    timestamp: WallTime,
    node: NodeId,
    relay: RelayIndex,
    on: bool,
) -> Duration {
    history
        .iter()
        .rev()
        .filter(|e| e.is_channel(node, relay))
        .find(|e| e.on != on)
        .map(|e| timestamp - e.timestamp)
        .unwrap_or(Duration::ZERO)
}

/// Append-only transition log over a durable store
pub struct EventLog {
    store: Arc<dyn Store>,
    scan_depth: usize,
}

impl EventLog {
    pub fn new(store: Arc<dyn Store>, scan_depth: usize) -> Self {
        EventLog { store, scan_depth }
    }

    pub fn scan_depth(&self) -> usize {
        self.scan_depth
    }

    /// Record a transition of `relay` on `node` to `on`
    ///
    /// An unreadable history degrades to a zero duration; a failed append
    /// is returned to the caller.
    pub fn append(
        &self,
        timestamp: WallTime,
        node: NodeId,
        node_name: &str,
        relay: RelayIndex,
        on: bool,
    ) -> HubResult<LogEntry> {
        let duration = match self.store.read_log_tail(self.scan_depth) {
            Ok(history) => derive_duration(&history, timestamp, node, relay, on),
            Err(e) => {
                tracing::warn!("log history unavailable, recording zero duration: {}", e);
                Duration::ZERO
            }
        };

        let entry = LogEntry {
            timestamp,
            node,
            node_name: node_name.to_string(),
            relay,
            on,
            duration_secs: duration.as_secs(),
        };
        self.store.append_log(&entry)?;
        Ok(entry)
    }

    /// Up to `n` most recent entries, newest first
    pub fn recent(&self, n: usize) -> HubResult<Vec<LogEntry>> {
        let mut entries = self.store.read_log_tail(n)?;
        entries.reverse();
        Ok(entries)
    }
}
