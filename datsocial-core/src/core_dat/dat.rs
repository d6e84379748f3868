//! Directory-backed dat store
//!
//! On-disk layout of one dat:
//!
//! ```text
//! <dir>/dat.json     key record (the public identifier)
//! <dir>/log          append-only entry log, crc32-checksummed frames
//! <dir>/<entry>      named entries (e.g. user.json, handshakes/<id>.blob)
//! ```
//!
//! The log holds length-prefixed bincode frames. Named entries are written
//! atomically (temp file + rename) so a replica never copies a partial
//! write. Only the owning process ever writes a dat; replicas read.

use crate::core_dat::errors::DatError;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Public identifier of a dat
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatKey([u8; 32]);

impl DatKey {
    /// Allocate a fresh key for a newly created dat
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        DatKey(bytes)
    }

    /// Hex form used in manifests and the swarm directory
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for DatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for DatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DatKey({})", self.to_hex())
    }
}

impl FromStr for DatKey {
    type Err = DatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| DatError::Corrupt(format!("bad key hex: {}", e)))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| DatError::Corrupt("dat key must be 32 bytes".to_string()))?;
        Ok(DatKey(arr))
    }
}

impl Serialize for DatKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DatKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Key record persisted as `dat.json`
#[derive(Debug, Serialize, Deserialize)]
struct DatRecord {
    key: DatKey,
}

/// One frame in the append-only log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Sequence number, dense from 0
    pub seq: u64,
    /// Milliseconds since the Unix epoch at append time
    pub timestamp_ms: u64,
    /// Entry payload
    pub data: Vec<u8>,
    /// crc32 of the payload
    pub checksum: u32,
}

impl LogEntry {
    fn new(seq: u64, data: Vec<u8>) -> Self {
        let checksum = crc32fast::hash(&data);
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        LogEntry {
            seq,
            timestamp_ms,
            data,
            checksum,
        }
    }

    /// Recompute the payload checksum and compare
    pub fn verify_checksum(&self) -> bool {
        crc32fast::hash(&self.data) == self.checksum
    }
}

const KEY_RECORD: &str = "dat.json";
const LOG_FILE: &str = "log";

/// Open handle to a local dat directory
pub struct Dat {
    key: DatKey,
    path: PathBuf,
    next_seq: u64,
    closed: bool,
}

impl Dat {
    /// Create a new, owned dat at `path` with a freshly allocated key
    pub fn create(path: &Path) -> Result<Self, DatError> {
        fs::create_dir_all(path)?;

        let key = DatKey::generate();
        let record = serde_json::to_vec_pretty(&DatRecord { key })
            .map_err(|e| DatError::Serialization(e.to_string()))?;
        write_atomic(&path.join(KEY_RECORD), &record)?;
        File::create(path.join(LOG_FILE))?;

        Ok(Dat {
            key,
            path: path.to_path_buf(),
            next_seq: 0,
            closed: false,
        })
    }

    /// Open an existing dat directory (owned or replicated)
    pub fn open(path: &Path) -> Result<Self, DatError> {
        let record_path = path.join(KEY_RECORD);
        if !record_path.exists() {
            return Err(DatError::NotFound(path.display().to_string()));
        }

        let record: DatRecord = serde_json::from_slice(&fs::read(&record_path)?)
            .map_err(|e| DatError::Corrupt(format!("bad key record: {}", e)))?;

        let mut dat = Dat {
            key: record.key,
            path: path.to_path_buf(),
            next_seq: 0,
            closed: false,
        };
        dat.next_seq = dat.read_all()?.last().map(|e| e.seq + 1).unwrap_or(0);
        Ok(dat)
    }

    pub fn key(&self) -> &DatKey {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Append a payload to the log, returning its sequence number
    pub fn append(&mut self, data: &[u8]) -> Result<u64, DatError> {
        self.ensure_open()?;

        let entry = LogEntry::new(self.next_seq, data.to_vec());
        let frame =
            bincode::serialize(&entry).map_err(|e| DatError::Serialization(e.to_string()))?;

        let mut file = OpenOptions::new()
            .append(true)
            .open(self.path.join(LOG_FILE))?;
        file.write_all(&(frame.len() as u32).to_le_bytes())?;
        file.write_all(&frame)?;
        file.flush()?;

        self.next_seq = entry.seq + 1;
        Ok(entry.seq)
    }

    /// Read and verify every log entry
    pub fn read_all(&self) -> Result<Vec<LogEntry>, DatError> {
        self.ensure_open()?;

        let log_path = self.path.join(LOG_FILE);
        if !log_path.exists() {
            return Ok(Vec::new());
        }

        let mut file = File::open(log_path)?;
        let mut entries = Vec::new();
        let mut len_buf = [0u8; 4];
        loop {
            match file.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut frame = vec![0u8; len];
            file.read_exact(&mut frame)
                .map_err(|_| DatError::Corrupt("truncated log frame".to_string()))?;

            let entry: LogEntry = bincode::deserialize(&frame)
                .map_err(|e| DatError::Corrupt(format!("bad log frame: {}", e)))?;
            if !entry.verify_checksum() {
                return Err(DatError::Corrupt(format!(
                    "checksum mismatch at seq {}",
                    entry.seq
                )));
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Atomically write a named entry inside the dat directory
    pub fn write_entry(&self, name: &str, data: &[u8]) -> Result<(), DatError> {
        self.ensure_open()?;

        let entry_path = self.path.join(name);
        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomic(&entry_path, data)
    }

    /// Read a named entry
    pub fn read_entry(&self, name: &str) -> Result<Vec<u8>, DatError> {
        self.ensure_open()?;

        let entry_path = self.path.join(name);
        if !entry_path.exists() {
            return Err(DatError::NotFound(name.to_string()));
        }
        Ok(fs::read(entry_path)?)
    }

    /// Release the handle. Idempotent; persisted state is untouched and a
    /// fresh handle can reopen the same directory.
    pub fn close(&mut self) {
        self.closed = true;
    }

    fn ensure_open(&self) -> Result<(), DatError> {
        if self.closed {
            return Err(DatError::Closed);
        }
        Ok(())
    }
}

/// Write to a temp file, then rename into place
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), DatError> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, data)?;
    fs::rename(temp_path, path)?;
    Ok(())
}
