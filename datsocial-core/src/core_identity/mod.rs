//! Identity module
//!
//! A user's identity is an asymmetric keypair plus a derived fingerprint
//! (the [`UserId`]). The private key never leaves the process unencrypted:
//! at rest it lives in a passphrase-protected container written by the
//! keystore, and only the public key and fingerprint are ever shared.

use thiserror::Error;

pub mod keypair;
pub mod keystore;
pub mod sealed;
pub mod user_id;

pub use keypair::{Keypair, MIN_KEY_BITS};
pub use keystore::{load, setup, Identity};
pub use sealed::{open, seal};
pub use user_id::UserId;

/// Identity and keystore errors
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("invalid passphrase")]
    InvalidPassphrase,

    #[error("identity not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
