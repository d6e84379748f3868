//! Sealed blobs for invite delivery
//!
//! A handshake invite is a small payload only the intended peer can read.
//! [`seal`] encrypts to a recipient's public key with an ephemeral X25519
//! key: DH shared secret → HKDF-SHA256 → ChaCha20-Poly1305. The blob is
//! self-contained:
//!
//! ```text
//! [Ephemeral public key: 32 bytes]
//! [Nonce: 12 bytes]
//! [Ciphertext + AEAD tag: variable]
//! ```
//!
//! Opening with the wrong secret key fails the AEAD check; corrupt data is
//! never returned.

use crate::core_identity::keypair::Keypair;
use crate::core_identity::IdentityError;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = 32 + NONCE_LEN;

/// Domain separation for the derived blob key
const HKDF_INFO: &[u8] = b"datsocial sealed invite v1";

/// Encrypt `plaintext` so that only the holder of the secret key matching
/// `recipient_pub` can read it.
pub fn seal(recipient_pub: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, IdentityError> {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    let ephemeral = StaticSecret::from(seed);
    seed.zeroize();

    let ephemeral_pub = PublicKey::from(&ephemeral);
    let recipient = PublicKey::from(*recipient_pub);
    let shared = ephemeral.diffie_hellman(&recipient);

    let key = derive_blob_key(shared.as_bytes(), ephemeral_pub.as_bytes(), recipient_pub)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| IdentityError::Encryption(format!("seal failed: {}", e)))?;

    let mut blob = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    blob.extend_from_slice(ephemeral_pub.as_bytes());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Open a blob produced by [`seal`] with the recipient's keypair.
pub fn open(recipient: &Keypair, blob: &[u8]) -> Result<Vec<u8>, IdentityError> {
    if blob.len() < HEADER_LEN + 16 {
        return Err(IdentityError::Decryption("blob truncated".to_string()));
    }

    let ephemeral_pub: [u8; 32] = blob[..32]
        .try_into()
        .map_err(|_| IdentityError::Decryption("blob truncated".to_string()))?;
    let nonce_bytes = &blob[32..HEADER_LEN];
    let ciphertext = &blob[HEADER_LEN..];

    let secret = recipient.static_secret()?;
    let shared = secret.diffie_hellman(&PublicKey::from(ephemeral_pub));

    let key = derive_blob_key(shared.as_bytes(), &ephemeral_pub, recipient.public_key())?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| IdentityError::Decryption("blob was not sealed for this key".to_string()))
}

/// Shared secret → blob key, bound to both public keys
fn derive_blob_key(
    shared: &[u8],
    ephemeral_pub: &[u8; 32],
    recipient_pub: &[u8; 32],
) -> Result<Vec<u8>, IdentityError> {
    let mut salt = Vec::with_capacity(64);
    salt.extend_from_slice(ephemeral_pub);
    salt.extend_from_slice(recipient_pub);

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut key = vec![0u8; 32];
    hk.expand(HKDF_INFO, &mut key)
        .map_err(|e| IdentityError::Encryption(format!("key expansion failed: {}", e)))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_round_trip() {
        let kp = Keypair::generate(512).unwrap();
        let blob = seal(kp.public_key(), b"relationship dat key").unwrap();
        let opened = open(&kp, &blob).unwrap();
        assert_eq!(opened, b"relationship dat key");
    }

    #[test]
    fn test_wrong_recipient_cannot_open() {
        let intended = Keypair::generate(512).unwrap();
        let other = Keypair::generate(512).unwrap();

        let blob = seal(intended.public_key(), b"secret payload").unwrap();
        let result = open(&other, &blob);
        assert!(matches!(result, Err(IdentityError::Decryption(_))));
    }

    #[test]
    fn test_tampered_blob_rejected() {
        let kp = Keypair::generate(512).unwrap();
        let mut blob = seal(kp.public_key(), b"payload").unwrap();
        let len = blob.len();
        blob[len - 1] ^= 0x01;

        assert!(matches!(open(&kp, &blob), Err(IdentityError::Decryption(_))));
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let kp = Keypair::generate(512).unwrap();
        let blob = seal(kp.public_key(), b"payload").unwrap();
        assert!(matches!(
            open(&kp, &blob[..20]),
            Err(IdentityError::Decryption(_))
        ));
    }

    #[test]
    fn test_blobs_are_nondeterministic() {
        let kp = Keypair::generate(512).unwrap();
        let a = seal(kp.public_key(), b"payload").unwrap();
        let b = seal(kp.public_key(), b"payload").unwrap();
        assert_ne!(a, b);
    }
}
