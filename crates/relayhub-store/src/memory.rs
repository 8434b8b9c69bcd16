//! In-process store

use parking_lot::Mutex;
use relayhub_core::{HubError, HubResult};

use crate::{LogEntry, NodeRecord, PeerRecord, Store};

#[derive(Debug, Default)]
struct MemoryInner {
    snapshot: Vec<NodeRecord>,
    directory: Vec<PeerRecord>,
    log: Vec<LogEntry>,
    fail_writes: bool,
    snapshot_writes: u64,
    directory_writes: u64,
}

/// Store that keeps all records in memory
///
/// Write failures can be injected to exercise the hub's "report but keep
/// memory as truth" path.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Seed the store as if a previous run had saved these records
    pub fn with_records(directory: Vec<PeerRecord>, snapshot: Vec<NodeRecord>) -> Self {
        let store = MemoryStore::new();
        {
            let mut inner = store.inner.lock();
            inner.directory = directory;
            inner.snapshot = snapshot;
        }
        store
    }

    /// Make every subsequent write fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Full log, oldest first
    pub fn log(&self) -> Vec<LogEntry> {
        self.inner.lock().log.clone()
    }

    pub fn log_len(&self) -> usize {
        self.inner.lock().log.len()
    }

    pub fn snapshot(&self) -> Vec<NodeRecord> {
        self.inner.lock().snapshot.clone()
    }

    pub fn directory(&self) -> Vec<PeerRecord> {
        self.inner.lock().directory.clone()
    }

    /// Number of successful snapshot rewrites
    pub fn snapshot_writes(&self) -> u64 {
        self.inner.lock().snapshot_writes
    }

    /// Number of successful directory rewrites
    pub fn directory_writes(&self) -> u64 {
        self.inner.lock().directory_writes
    }
}

fn check_writable(inner: &MemoryInner) -> HubResult<()> {
    if inner.fail_writes {
        Err(HubError::Persistence("write rejected".into()))
    } else {
        Ok(())
    }
}

impl Store for MemoryStore {
    fn load_snapshot(&self) -> HubResult<Vec<NodeRecord>> {
        Ok(self.inner.lock().snapshot.clone())
    }

    fn save_snapshot(&self, table: &[NodeRecord]) -> HubResult<()> {
        let mut inner = self.inner.lock();
        check_writable(&inner)?;
        inner.snapshot = table.to_vec();
        inner.snapshot_writes += 1;
        Ok(())
    }

    fn load_directory(&self) -> HubResult<Vec<PeerRecord>> {
        Ok(self.inner.lock().directory.clone())
    }

    fn save_directory(&self, peers: &[PeerRecord]) -> HubResult<()> {
        let mut inner = self.inner.lock();
        check_writable(&inner)?;
        inner.directory = peers.to_vec();
        inner.directory_writes += 1;
        Ok(())
    }

    fn append_log(&self, entry: &LogEntry) -> HubResult<()> {
        let mut inner = self.inner.lock();
        check_writable(&inner)?;
        inner.log.push(entry.clone());
        Ok(())
    }

    fn read_log_tail(&self, max: usize) -> HubResult<Vec<LogEntry>> {
        let inner = self.inner.lock();
        let start = inner.log.len().saturating_sub(max);
        Ok(inner.log[start..].to_vec())
    }
}
