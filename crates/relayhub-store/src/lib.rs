//! relayhub Store - Persistence boundary
//!
//! This crate defines what the hub core persists and where:
//! - Node state snapshot (read full, atomically replace)
//! - Peer directory (address + display name, registration order)
//! - Event log (append-only, read back by tail)
//!
//! `MemoryStore` keeps everything in process; `FileStore` keeps it in a
//! data directory as JSON files.

pub mod record;
pub mod memory;
pub mod file;

pub use record::*;
pub use memory::*;
pub use file::*;

use relayhub_core::HubResult;

/// Durable store consumed by the hub core
///
/// Calls are treated as fast, synchronous and best-effort. Callers hold the
/// hub's state lock across them so memory and store never diverge.
pub trait Store: Send + Sync {
    /// Load the last saved node state table
    fn load_snapshot(&self) -> HubResult<Vec<NodeRecord>>;

    /// Replace the node state table
    fn save_snapshot(&self, table: &[NodeRecord]) -> HubResult<()>;

    /// Load known peers in registration order
    fn load_directory(&self) -> HubResult<Vec<PeerRecord>>;

    /// Replace the peer list
    fn save_directory(&self, peers: &[PeerRecord]) -> HubResult<()>;

    /// Append one log entry
    fn append_log(&self, entry: &LogEntry) -> HubResult<()>;

    /// Up to `max` most recent log entries, oldest first
    fn read_log_tail(&self, max: usize) -> HubResult<Vec<LogEntry>>;
}
