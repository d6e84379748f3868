//! Asymmetric keypair for identity encryption
//!
//! X25519 keys: the public half identifies the user (via its fingerprint)
//! and receives sealed invite blobs, the secret half opens them. The secret
//! is zeroized on drop and redacted from `Debug` output.

use crate::core_identity::IdentityError;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

/// Smallest key strength accepted by [`Keypair::generate`]
pub const MIN_KEY_BITS: u32 = 256;

/// Identity keypair
#[derive(Clone, Serialize, Deserialize)]
pub struct Keypair {
    /// Public key bytes (32 bytes), shared freely
    public: [u8; 32],
    /// Secret key bytes, zeroized on drop; encrypted at rest by the keystore
    secret: Vec<u8>,
}

impl Keypair {
    /// Generate a new keypair.
    ///
    /// `num_bits` is the requested key strength; values below
    /// [`MIN_KEY_BITS`] are rejected. The curve itself has a fixed key
    /// length, so any accepted value yields a 32-byte key.
    pub fn generate(num_bits: u32) -> Result<Self, IdentityError> {
        if num_bits < MIN_KEY_BITS {
            return Err(IdentityError::KeyGeneration(format!(
                "requested {} bits, minimum is {}",
                num_bits, MIN_KEY_BITS
            )));
        }

        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);

        let secret = StaticSecret::from(seed);
        let public = PublicKey::from(&secret);
        seed.zeroize();

        Ok(Keypair {
            public: public.to_bytes(),
            secret: secret.to_bytes().to_vec(),
        })
    }

    /// Public key bytes
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public
    }

    /// Reconstruct the X25519 secret for key agreement
    pub(crate) fn static_secret(&self) -> Result<StaticSecret, IdentityError> {
        let bytes: [u8; 32] = self
            .secret
            .as_slice()
            .try_into()
            .map_err(|_| IdentityError::Decryption("malformed secret key".to_string()))?;
        Ok(StaticSecret::from(bytes))
    }

    /// Serialize for the keystore container
    pub fn to_bytes(&self) -> Result<Vec<u8>, IdentityError> {
        bincode::serialize(self).map_err(|e| IdentityError::Serialization(e.to_string()))
    }

    /// Deserialize from keystore container bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        bincode::deserialize(bytes).map_err(|e| IdentityError::Serialization(e.to_string()))
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &hex::encode(self.public))
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Drop for Keypair {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}
