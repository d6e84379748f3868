//! Dat registry
//!
//! Creates, loads and closes dats and tracks the open handles by key and
//! logical name. Replication is brokered through a shared announcement
//! directory (`swarm_dir`): owners announce `key -> origin path`, loaders
//! poll the announcement and copy a snapshot. Two processes that share a
//! swarm directory can reach each other's dats with no other channel,
//! which is the only coordination surface the protocol assumes.
//!
//! `load` is the single suspension point in the system: it retries with a
//! configured backoff until the dat is announced or the timeout elapses.

use crate::config::DatConfig;
use crate::core_dat::dat::{Dat, DatKey};
use crate::core_dat::errors::DatError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Registry of open dat handles
pub struct DatRegistry {
    swarm_dir: PathBuf,
    load_timeout: Duration,
    retry_backoff: Duration,
    /// Open handles: key -> local directory
    open: HashMap<DatKey, PathBuf>,
    /// Logical names of locally created dats
    names: HashMap<String, DatKey>,
}

impl DatRegistry {
    pub fn new(config: &DatConfig) -> Result<Self, DatError> {
        fs::create_dir_all(&config.swarm_dir)?;
        Ok(DatRegistry {
            swarm_dir: config.swarm_dir.clone(),
            load_timeout: config.load_timeout,
            retry_backoff: config.retry_backoff,
            open: HashMap::new(),
            names: HashMap::new(),
        })
    }

    /// Create a new, owned dat at `base_dir/logical_name` and announce it
    pub fn create(&mut self, base_dir: &Path, logical_name: &str) -> Result<Dat, DatError> {
        let path = base_dir.join(logical_name);
        let dat = Dat::create(&path)?;

        self.announce(dat.key(), &path)?;
        self.open.insert(*dat.key(), path);
        self.names.insert(logical_name.to_string(), *dat.key());

        debug!(key = %dat.key(), name = logical_name, "dat created");
        Ok(dat)
    }

    /// Reopen a local dat directory (after a restart) and re-announce it
    pub fn open_local(&mut self, path: &Path) -> Result<Dat, DatError> {
        let dat = Dat::open(path)?;
        self.announce(dat.key(), path)?;
        self.open.insert(*dat.key(), path.to_path_buf());
        Ok(dat)
    }

    /// Load a possibly remote dat identified by `key` into `dest_dir`.
    ///
    /// Suspends while the dat is unreachable, retrying every
    /// `retry_backoff` until `load_timeout` has elapsed, then fails with
    /// [`DatError::Unavailable`]. On success `dest_dir` holds a snapshot
    /// replica; calling again refreshes it.
    pub async fn load(&mut self, key: &DatKey, dest_dir: &Path) -> Result<Dat, DatError> {
        let origin = self.wait_for_announcement(key).await?;

        replicate_dir(&origin, dest_dir)?;
        let dat = Dat::open(dest_dir)?;
        if dat.key() != key {
            return Err(DatError::Corrupt(format!(
                "replica key mismatch: expected {}, found {}",
                key,
                dat.key()
            )));
        }

        self.open.insert(*key, dest_dir.to_path_buf());
        debug!(key = %key, dest = %dest_dir.display(), "dat replicated");
        Ok(dat)
    }

    async fn wait_for_announcement(&self, key: &DatKey) -> Result<PathBuf, DatError> {
        let deadline = Instant::now() + self.load_timeout;
        let announce_path = self.swarm_dir.join(key.to_hex());

        loop {
            match fs::read_to_string(&announce_path) {
                Ok(origin) => return Ok(PathBuf::from(origin.trim())),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                return Err(DatError::Unavailable(key.to_hex()));
            }
            warn!(key = %key, "dat not yet reachable, retrying");
            tokio::time::sleep(self.retry_backoff).await;
        }
    }

    /// Close a handle and drop it from the registry. Idempotent.
    pub fn close(&mut self, dat: &mut Dat) {
        dat.close();
        self.open.remove(dat.key());
    }

    /// Close bookkeeping for every tracked handle
    pub fn clear(&mut self) {
        self.open.clear();
        self.names.clear();
    }

    /// Update the tracked location of an open handle after a move
    pub(crate) fn retarget(&mut self, key: &DatKey, path: &Path) {
        if let Some(tracked) = self.open.get_mut(key) {
            *tracked = path.to_path_buf();
        }
    }

    /// Key of a locally created dat, by logical name
    pub fn key_for(&self, logical_name: &str) -> Option<&DatKey> {
        self.names.get(logical_name)
    }

    /// Withdraw a dat's swarm announcement and drop its bookkeeping, so no
    /// peer can replicate it anymore. The local directory is untouched.
    pub(crate) fn retract(&mut self, key: &DatKey) -> Result<(), DatError> {
        let announce_path = self.swarm_dir.join(key.to_hex());
        if announce_path.exists() {
            fs::remove_file(announce_path)?;
        }
        self.open.remove(key);
        self.names.retain(|_, k| k != key);
        Ok(())
    }

    fn announce(&self, key: &DatKey, path: &Path) -> Result<(), DatError> {
        let origin = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf())
            .display()
            .to_string();
        fs::write(self.swarm_dir.join(key.to_hex()), origin)?;
        Ok(())
    }
}

/// Copy a dat directory snapshot into `dest`, skipping in-flight temp files
fn replicate_dir(src: &Path, dest: &Path) -> Result<(), DatError> {
    if !src.exists() {
        return Err(DatError::NotFound(src.display().to_string()));
    }
    fs::create_dir_all(dest)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().ends_with(".tmp") {
            continue;
        }
        let target = dest.join(&name);
        if entry.file_type()?.is_dir() {
            replicate_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(swarm: &Path) -> DatConfig {
        DatConfig {
            swarm_dir: swarm.to_path_buf(),
            load_timeout: Duration::from_millis(300),
            retry_backoff: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_create_then_load_elsewhere() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir.path().join("swarm"));

        let mut owner = DatRegistry::new(&config).unwrap();
        let mut dat = owner.create(&dir.path().join("alice"), "public-metadat").unwrap();
        dat.append(b"hello").unwrap();
        dat.write_entry("user.json", b"{}").unwrap();

        // An independent registry sharing the swarm dir can replicate it
        let mut peer = DatRegistry::new(&config).unwrap();
        let replica = peer
            .load(dat.key(), &dir.path().join("bob").join("snapshot"))
            .await
            .unwrap();

        assert_eq!(replica.key(), dat.key());
        assert_eq!(replica.read_all().unwrap().len(), 1);
        assert_eq!(replica.read_entry("user.json").unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_load_unknown_key_times_out() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir.path().join("swarm"));
        let mut registry = DatRegistry::new(&config).unwrap();

        let start = Instant::now();
        let result = registry
            .load(&DatKey::generate(), &dir.path().join("dest"))
            .await;

        assert!(matches!(result, Err(DatError::Unavailable(_))));
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_reload_refreshes_snapshot() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir.path().join("swarm"));

        let mut owner = DatRegistry::new(&config).unwrap();
        let dat = owner.create(&dir.path().join("alice"), "public-metadat").unwrap();
        dat.write_entry("user.json", b"v1").unwrap();

        let mut peer = DatRegistry::new(&config).unwrap();
        let dest = dir.path().join("bob").join("snapshot");
        let replica = peer.load(dat.key(), &dest).await.unwrap();
        assert_eq!(replica.read_entry("user.json").unwrap(), b"v1");

        dat.write_entry("user.json", b"v2").unwrap();
        let replica = peer.load(dat.key(), &dest).await.unwrap();
        assert_eq!(replica.read_entry("user.json").unwrap(), b"v2");
    }

    #[tokio::test]
    async fn test_registry_close_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir.path().join("swarm"));
        let mut registry = DatRegistry::new(&config).unwrap();

        let mut dat = registry.create(dir.path(), "d").unwrap();
        registry.close(&mut dat);
        registry.close(&mut dat);
        assert!(dat.is_closed());
    }

    #[tokio::test]
    async fn test_retract_withdraws_announcement() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir.path().join("swarm"));

        let mut owner = DatRegistry::new(&config).unwrap();
        let dat = owner.create(&dir.path().join("alice"), "d").unwrap();
        let key = *dat.key();
        owner.retract(&key).unwrap();

        // No longer reachable by peers, but the local directory survives
        let mut peer = DatRegistry::new(&config).unwrap();
        let result = peer.load(&key, &dir.path().join("dest")).await;
        assert!(matches!(result, Err(DatError::Unavailable(_))));
        assert!(dir.path().join("alice").join("d").join("dat.json").exists());
        assert_eq!(owner.key_for("d"), None);
    }

    #[tokio::test]
    async fn test_logical_name_lookup() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir.path().join("swarm"));
        let mut registry = DatRegistry::new(&config).unwrap();

        let dat = registry.create(dir.path(), "stuff").unwrap();
        assert_eq!(registry.key_for("stuff"), Some(dat.key()));
        assert_eq!(registry.key_for("other"), None);
    }
}
