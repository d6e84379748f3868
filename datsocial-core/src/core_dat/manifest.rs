//! User manifests
//!
//! [`PublicManifest`] is the single named JSON record (`user.json`) inside
//! a user's public metadat: published dat keys, acknowledged relationships,
//! and pending handshake invites. Only the owner writes it; every peer that
//! follows or handshakes reads a replicated snapshot. Writes go through the
//! dat's atomic entry write, so a reader never observes a partial manifest.
//!
//! [`PrivateState`] is local bookkeeping (follow and relationship paths)
//! and is never replicated.

use crate::core_dat::dat::Dat;
use crate::core_dat::errors::DatError;
use crate::core_identity::UserId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the manifest entry inside the public metadat
pub const MANIFEST_ENTRY: &str = "user.json";

/// Filename of the local private state
const PRIVATE_STATE_FILE: &str = "private.json";

/// A relationship as published in the owner's manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEntry {
    /// Owner-local path of the relationship dat
    pub path: String,
}

/// The owner-written public record of a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicManifest {
    /// Display name; never a lookup key
    pub name: String,
    /// Hex-encoded identity public key; followers derive the owner's
    /// fingerprint from this
    pub pub_key: String,
    /// Hex keys of dats published by this user
    #[serde(default)]
    pub dats: Vec<String>,
    /// Followed peers, mirrored from the private follow index
    #[serde(default)]
    pub follows: BTreeMap<UserId, String>,
    /// Mutually acknowledged relationships, keyed by peer fingerprint
    #[serde(default)]
    pub relationships: BTreeMap<UserId, RelationshipEntry>,
    /// Pending invites: peer fingerprint -> blob entry inside this dat
    #[serde(default)]
    pub handshakes: BTreeMap<UserId, String>,
}

impl PublicManifest {
    pub fn new(name: &str, pub_key: &[u8; 32]) -> Self {
        PublicManifest {
            name: name.to_string(),
            pub_key: hex::encode(pub_key),
            dats: Vec::new(),
            follows: BTreeMap::new(),
            relationships: BTreeMap::new(),
            handshakes: BTreeMap::new(),
        }
    }

    /// Decode the owner's public key bytes
    pub fn public_key_bytes(&self) -> Result<[u8; 32], DatError> {
        let bytes = hex::decode(&self.pub_key)
            .map_err(|e| DatError::Corrupt(format!("bad manifest pub_key: {}", e)))?;
        bytes
            .try_into()
            .map_err(|_| DatError::Corrupt("manifest pub_key must be 32 bytes".to_string()))
    }

    /// Record a published dat key; idempotent
    pub fn add_dat(&mut self, key_hex: String) {
        if !self.dats.contains(&key_hex) {
            self.dats.push(key_hex);
        }
    }
}

/// Read the manifest entry of a (local or replicated) dat
pub fn read_public(dat: &Dat) -> Result<PublicManifest, DatError> {
    let bytes = dat.read_entry(MANIFEST_ENTRY)?;
    serde_json::from_slice(&bytes).map_err(|e| DatError::Corrupt(format!("bad manifest: {}", e)))
}

/// Write the manifest entry; atomic from any reader's perspective
pub fn write_public(dat: &Dat, manifest: &PublicManifest) -> Result<(), DatError> {
    let bytes = serde_json::to_vec_pretty(manifest)
        .map_err(|e| DatError::Serialization(e.to_string()))?;
    dat.write_entry(MANIFEST_ENTRY, &bytes)
}

/// Local-only follow/relationship bookkeeping
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrivateState {
    /// Peer fingerprint -> local follow snapshot directory
    #[serde(default)]
    pub follows: BTreeMap<UserId, PathBuf>,
    /// Peer fingerprint -> local relationship dat directory
    #[serde(default)]
    pub relationships: BTreeMap<UserId, PathBuf>,
}

impl PrivateState {
    /// Load from `base_dir`, or start empty if nothing is persisted yet
    pub fn load(base_dir: &Path) -> Result<Self, DatError> {
        let path = base_dir.join(PRIVATE_STATE_FILE);
        if !path.exists() {
            return Ok(PrivateState::default());
        }
        serde_json::from_slice(&fs::read(path)?)
            .map_err(|e| DatError::Corrupt(format!("bad private state: {}", e)))
    }

    /// Persist atomically under `base_dir`
    pub fn save(&self, base_dir: &Path) -> Result<(), DatError> {
        let bytes =
            serde_json::to_vec_pretty(self).map_err(|e| DatError::Serialization(e.to_string()))?;
        let path = base_dir.join(PRIVATE_STATE_FILE);
        let temp = path.with_extension("tmp");
        fs::write(&temp, bytes)?;
        fs::rename(temp, path)?;
        Ok(())
    }
}
