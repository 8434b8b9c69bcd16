//! Data-directory store
//!
//! Layout under the data directory:
//! - `relays.json`: node state snapshot, replaced via write-then-rename
//! - `peers.json`: peer directory, replaced via write-then-rename
//! - `events.log`: one JSON log entry per line, append-only

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use relayhub_core::{HubError, HubResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{LogEntry, NodeRecord, PeerRecord, Store};

const SNAPSHOT_FILE: &str = "relays.json";
const DIRECTORY_FILE: &str = "peers.json";
const LOG_FILE: &str = "events.log";

/// Bytes read per step when scanning the log backwards
const TAIL_CHUNK: u64 = 8 * 1024;

/// Store backed by files in one directory
pub struct FileStore {
    root: PathBuf,
    /// Serializes file I/O from concurrent callers
    io: Mutex<()>,
}

impl FileStore {
    /// Open (creating if needed) a data directory
    pub fn open(root: impl AsRef<Path>) -> HubResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| io_error(&root, e))?;
        Ok(FileStore {
            root,
            io: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn read_json<T: DeserializeOwned + Default>(&self, name: &str) -> HubResult<T> {
        let path = self.path(name);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(io_error(&path, e)),
        };
        serde_json::from_slice(&data)
            .map_err(|e| HubError::Persistence(format!("{}: {}", path.display(), e)))
    }

    fn replace_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> HubResult<()> {
        let path = self.path(name);
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(value)
            .map_err(|e| HubError::Persistence(e.to_string()))?;

        let mut file = File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
        file.write_all(&data).map_err(|e| io_error(&tmp, e))?;
        file.sync_all().map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))
    }
}

fn io_error(path: &Path, e: io::Error) -> HubError {
    HubError::Persistence(format!("{}: {}", path.display(), e))
}

impl Store for FileStore {
    fn load_snapshot(&self) -> HubResult<Vec<NodeRecord>> {
        let _guard = self.io.lock();
        self.read_json(SNAPSHOT_FILE)
    }

    fn save_snapshot(&self, table: &[NodeRecord]) -> HubResult<()> {
        let _guard = self.io.lock();
        self.replace_json(SNAPSHOT_FILE, table)
    }

    fn load_directory(&self) -> HubResult<Vec<PeerRecord>> {
        let _guard = self.io.lock();
        self.read_json(DIRECTORY_FILE)
    }

    fn save_directory(&self, peers: &[PeerRecord]) -> HubResult<()> {
        let _guard = self.io.lock();
        self.replace_json(DIRECTORY_FILE, peers)
    }

    fn append_log(&self, entry: &LogEntry) -> HubResult<()> {
        let _guard = self.io.lock();
        let path = self.path(LOG_FILE);
        let mut line =
            serde_json::to_vec(entry).map_err(|e| HubError::Persistence(e.to_string()))?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_error(&path, e))?;
        file.write_all(&line).map_err(|e| io_error(&path, e))
    }

    fn read_log_tail(&self, max: usize) -> HubResult<Vec<LogEntry>> {
        let _guard = self.io.lock();
        let path = self.path(LOG_FILE);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&path, e)),
        };
        let lines = read_tail_lines(&mut file, max).map_err(|e| io_error(&path, e))?;

        let mut entries = Vec::with_capacity(lines.len());
        for line in lines.iter().rev() {
            match serde_json::from_slice(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("skipping unreadable log line: {}", e),
            }
        }
        Ok(entries)
    }
}

/// Up to `max` non-blank lines from the end of `file`, newest first
///
/// Reads backwards in fixed chunks, so the cost depends on `max`, not on
/// the file size. Lines are raw bytes; decoding is left to the caller.
fn read_tail_lines(file: &mut File, max: usize) -> io::Result<Vec<Vec<u8>>> {
    let mut lines = Vec::new();
    if max == 0 {
        return Ok(lines);
    }

    let mut pos = file.seek(SeekFrom::End(0))?;
    // Bytes after the last newline seen so far, in file order
    let mut partial: Vec<u8> = Vec::new();
    let mut chunk = Vec::new();

    while pos > 0 && lines.len() < max {
        let step = TAIL_CHUNK.min(pos);
        pos -= step;
        file.seek(SeekFrom::Start(pos))?;
        chunk.resize(step as usize, 0);
        file.read_exact(&mut chunk)?;

        chunk.extend_from_slice(&partial);
        let mut end = chunk.len();
        partial.clear();
        while let Some(newline) = chunk[..end].iter().rposition(|&b| b == b'\n') {
            push_line(&mut lines, &chunk[newline + 1..end]);
            end = newline;
            if lines.len() >= max {
                return Ok(lines);
            }
        }
        partial.extend_from_slice(&chunk[..end]);
    }

    if lines.len() < max {
        push_line(&mut lines, &partial);
    }
    Ok(lines)
}

fn push_line(lines: &mut Vec<Vec<u8>>, line: &[u8]) {
    if !line.iter().all(u8::is_ascii_whitespace) {
        lines.push(line.to_vec());
    }
}
