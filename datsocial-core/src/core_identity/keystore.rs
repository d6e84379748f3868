//! Identity keystore with encryption at rest
//!
//! The public identity record lives in clear JSON (`identity.json`); the
//! keypair is stored in `secret.key`, a passphrase-protected container:
//!
//! ```text
//! [Magic: 8 bytes "DSKS0001"]
//! [Version: 1 byte]
//! [Salt: 16 bytes]
//! [Nonce: 12 bytes]
//! [Ciphertext + AEAD tag: variable]
//! ```
//!
//! The key is derived from the passphrase with Argon2id and the payload is
//! sealed with AES-256-GCM, so a wrong passphrase and a corrupted container
//! are both caught by the AEAD tag.

use crate::core_identity::keypair::Keypair;
use crate::core_identity::user_id::UserId;
use crate::core_identity::IdentityError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Magic header for the secret key container
const MAGIC_HEADER: &[u8; 8] = b"DSKS0001";

/// Current container format version
const FORMAT_VERSION: u8 = 1;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// magic(8) + version(1) + salt(16) + nonce(12)
const HEADER_SIZE: usize = 8 + 1 + SALT_LEN + NONCE_LEN;

/// Public identity record filename
const IDENTITY_FILE: &str = "identity.json";

/// Encrypted keypair container filename
const SECRET_FILE: &str = "secret.key";

/// A loaded identity: keypair plus derived fingerprint.
///
/// The fingerprint is computed once at setup, persisted, and never
/// recomputed afterwards.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Display name, never used for lookup
    pub name: String,
    /// Stable fingerprint of the public key
    pub id: UserId,
    /// Requested key strength recorded at setup
    pub num_bits: u32,
    keypair: Keypair,
}

impl Identity {
    /// Public key bytes
    pub fn public_key(&self) -> &[u8; 32] {
        self.keypair.public_key()
    }

    pub(crate) fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

/// Clear-text identity record persisted alongside the encrypted keypair
#[derive(Debug, Serialize, Deserialize)]
struct IdentityRecord {
    name: String,
    id: UserId,
    pub_key: String,
    num_bits: u32,
}

/// Generate and persist a new identity under `path`.
///
/// Creates the directory tree if absent. On any failure the partially
/// written files are removed, so a failed setup never produces an identity
/// that a later [`load`] would accept.
pub fn setup(
    path: &Path,
    name: &str,
    passphrase: &str,
    num_bits: u32,
) -> Result<Identity, IdentityError> {
    let keypair = Keypair::generate(num_bits)?;
    let id = UserId::from_public_key(keypair.public_key());

    fs::create_dir_all(path)?;

    let result = persist_identity(path, name, passphrase, num_bits, &keypair, id);
    if result.is_err() {
        // Leave nothing a later load could mistake for a valid identity.
        let _ = fs::remove_file(path.join(IDENTITY_FILE));
        let _ = fs::remove_file(path.join(SECRET_FILE));
    }
    result?;

    info!(user = %id, name, "identity created");

    Ok(Identity {
        name: name.to_string(),
        id,
        num_bits,
        keypair,
    })
}

fn persist_identity(
    path: &Path,
    name: &str,
    passphrase: &str,
    num_bits: u32,
    keypair: &Keypair,
    id: UserId,
) -> Result<(), IdentityError> {
    let record = IdentityRecord {
        name: name.to_string(),
        id,
        pub_key: hex::encode(keypair.public_key()),
        num_bits,
    };
    let record_json = serde_json::to_vec_pretty(&record)
        .map_err(|e| IdentityError::Serialization(e.to_string()))?;
    write_atomic(&path.join(IDENTITY_FILE), &record_json)?;

    let container = encrypt(passphrase, &keypair.to_bytes()?)?;
    write_atomic(&path.join(SECRET_FILE), &container)?;

    debug!(path = %path.display(), "identity material persisted");
    Ok(())
}

/// Load a persisted identity, decrypting the keypair with `passphrase`.
pub fn load(path: &Path, passphrase: &str) -> Result<Identity, IdentityError> {
    let record_path = path.join(IDENTITY_FILE);
    let secret_path = path.join(SECRET_FILE);
    if !record_path.exists() || !secret_path.exists() {
        return Err(IdentityError::NotFound(path.display().to_string()));
    }

    let record: IdentityRecord = serde_json::from_slice(&fs::read(&record_path)?)
        .map_err(|e| IdentityError::Serialization(e.to_string()))?;

    let container = fs::read(&secret_path)?;
    let keypair = Keypair::from_bytes(&decrypt(passphrase, &container)?)?;

    // The stored fingerprint is authoritative; the record and the decrypted
    // keypair must still agree on the public key.
    if hex::encode(keypair.public_key()) != record.pub_key {
        return Err(IdentityError::Decryption(
            "public key does not match identity record".to_string(),
        ));
    }

    debug!(user = %record.id, "identity loaded");

    Ok(Identity {
        name: record.name,
        id: record.id,
        num_bits: record.num_bits,
        keypair,
    })
}

/// Encrypt a keypair payload under a passphrase-derived key
fn encrypt(passphrase: &str, data: &[u8]) -> Result<Vec<u8>, IdentityError> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);

    let key = derive_key(passphrase, &salt)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| IdentityError::Encryption(format!("invalid key: {}", e)))?;
    let ciphertext = cipher
        .encrypt(nonce, data)
        .map_err(|e| IdentityError::Encryption(format!("encryption failed: {}", e)))?;

    let mut container = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    container.extend_from_slice(MAGIC_HEADER);
    container.push(FORMAT_VERSION);
    container.extend_from_slice(&salt);
    container.extend_from_slice(&nonce_bytes);
    container.extend_from_slice(&ciphertext);
    Ok(container)
}

/// Decrypt a keypair container.
///
/// An AEAD tag mismatch means either a wrong passphrase or a corrupted
/// container; both surface as [`IdentityError::InvalidPassphrase`].
fn decrypt(passphrase: &str, container: &[u8]) -> Result<Vec<u8>, IdentityError> {
    if container.len() < HEADER_SIZE + 16 {
        return Err(IdentityError::Decryption("container truncated".to_string()));
    }
    if &container[0..8] != MAGIC_HEADER {
        return Err(IdentityError::Decryption("invalid magic header".to_string()));
    }
    let version = container[8];
    if version != FORMAT_VERSION {
        return Err(IdentityError::Decryption(format!(
            "unsupported container version: {}",
            version
        )));
    }

    let salt = &container[9..9 + SALT_LEN];
    let nonce_bytes = &container[9 + SALT_LEN..9 + SALT_LEN + NONCE_LEN];
    let ciphertext = &container[HEADER_SIZE..];

    let key = derive_key(passphrase, salt)?;

    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| IdentityError::Decryption(format!("invalid key: {}", e)))?;
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| IdentityError::InvalidPassphrase)
}

/// Derive a 256-bit key from the passphrase using Argon2id
fn derive_key(passphrase: &str, salt: &[u8]) -> Result<Vec<u8>, IdentityError> {
    let params = argon2::Params::new(
        19 * 1024, // 19 MiB memory cost
        2,         // iterations
        1,         // lanes
        Some(32),
    )
    .map_err(|e| IdentityError::Encryption(format!("invalid Argon2 params: {}", e)))?;

    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key = vec![0u8; 32];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| IdentityError::Encryption(format!("key derivation failed: {}", e)))?;
    Ok(key)
}

/// Write to a temp file, then rename; readers never see a partial file
fn write_atomic(path: &PathBuf, data: &[u8]) -> Result<(), IdentityError> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, data)?;
    fs::rename(temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_setup_then_load_preserves_identity() {
        let dir = TempDir::new().unwrap();
        let created = setup(dir.path(), "jay", "arstarst", 512).unwrap();
        let loaded = load(dir.path(), "arstarst").unwrap();

        assert_eq!(created.public_key(), loaded.public_key());
        assert_eq!(created.id, loaded.id);
        assert_eq!(loaded.name, "jay");
        assert_eq!(loaded.num_bits, 512);
    }

    #[test]
    fn test_wrong_passphrase() {
        let dir = TempDir::new().unwrap();
        setup(dir.path(), "jay", "correct", 512).unwrap();

        let result = load(dir.path(), "wrong");
        assert!(matches!(result, Err(IdentityError::InvalidPassphrase)));
    }

    #[test]
    fn test_load_missing_identity() {
        let dir = TempDir::new().unwrap();
        let result = load(dir.path(), "arstarst");
        assert!(matches!(result, Err(IdentityError::NotFound(_))));
    }

    #[test]
    fn test_weak_key_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let result = setup(dir.path(), "jay", "arstarst", 64);
        assert!(matches!(result, Err(IdentityError::KeyGeneration(_))));
        assert!(matches!(
            load(dir.path(), "arstarst"),
            Err(IdentityError::NotFound(_))
        ));
    }

    #[test]
    fn test_corrupted_container() {
        let dir = TempDir::new().unwrap();
        setup(dir.path(), "jay", "arstarst", 512).unwrap();

        let secret_path = dir.path().join(SECRET_FILE);
        let mut container = fs::read(&secret_path).unwrap();
        let len = container.len();
        container[len - 1] ^= 0xFF;
        fs::write(&secret_path, &container).unwrap();

        // AEAD tag failure is indistinguishable from a wrong passphrase
        let result = load(dir.path(), "arstarst");
        assert!(matches!(result, Err(IdentityError::InvalidPassphrase)));
    }

    #[test]
    fn test_truncated_container() {
        let dir = TempDir::new().unwrap();
        setup(dir.path(), "jay", "arstarst", 512).unwrap();

        let secret_path = dir.path().join(SECRET_FILE);
        let container = fs::read(&secret_path).unwrap();
        fs::write(&secret_path, &container[..10]).unwrap();

        let result = load(dir.path(), "arstarst");
        assert!(matches!(result, Err(IdentityError::Decryption(_))));
    }

    #[test]
    fn test_bad_magic_header() {
        let dir = TempDir::new().unwrap();
        setup(dir.path(), "jay", "arstarst", 512).unwrap();

        let secret_path = dir.path().join(SECRET_FILE);
        let mut container = fs::read(&secret_path).unwrap();
        container[0] = b'X';
        fs::write(&secret_path, &container).unwrap();

        let result = load(dir.path(), "arstarst");
        assert!(matches!(result, Err(IdentityError::Decryption(_))));
    }

    #[test]
    fn test_container_salts_and_nonces_are_fresh() {
        let a = encrypt("pass", b"payload").unwrap();
        let b = encrypt("pass", b"payload").unwrap();
        assert_ne!(a[9..9 + SALT_LEN], b[9..9 + SALT_LEN]);
        assert_ne!(
            a[9 + SALT_LEN..HEADER_SIZE],
            b[9 + SALT_LEN..HEADER_SIZE]
        );
    }
}
