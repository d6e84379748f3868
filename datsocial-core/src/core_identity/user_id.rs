//! User fingerprints
//!
//! A [`UserId`] is the blake3 hash of a user's public key: stable,
//! collision-resistant, and computed exactly once at identity setup.
//! It is the lookup key for every follow/relationship/handshake map;
//! display names are never used for lookup.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Deterministic fingerprint of a public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId([u8; 32]);

impl UserId {
    /// Derive the fingerprint of a public key
    pub fn from_public_key(pubkey: &[u8]) -> Self {
        UserId(*blake3::hash(pubkey).as_bytes())
    }

    /// Raw fingerprint bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(&self.0).into_string())
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self)
    }
}

impl FromStr for UserId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| format!("invalid base58: {}", e))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "fingerprint must be 32 bytes".to_string())?;
        Ok(UserId(arr))
    }
}

// Serialized as a base58 string so ids can key JSON maps in the manifest.
impl Serialize for UserId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
