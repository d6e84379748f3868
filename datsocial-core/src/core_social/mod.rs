//! Social layer
//!
//! Operations on the [`User`] aggregate: one-directional follows and the
//! two-phase handshake protocol that upgrades a follow into a mutual,
//! privately keyed relationship.

use crate::core_dat::DatError;
use crate::core_identity::{IdentityError, UserId};
use thiserror::Error;

pub mod follow;
pub mod handshake;
pub mod user;

pub use follow::{follow, PeerProfile};
pub use handshake::{check_handshake, handshake, HandshakeState};
pub use user::User;

/// Errors from follow and handshake operations
#[derive(Debug, Error)]
pub enum SocialError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Dat(#[from] DatError),

    /// The peer's dat could not be reached; transient, retry later.
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    /// No invite addressed to this user yet; the initiator may simply not
    /// have delivered it. Re-poll, this is not fatal.
    #[error("no handshake invite addressed to {0}")]
    HandshakeNotFound(UserId),

    /// The invite exists but cannot be used: decryption failed or the
    /// payload is malformed. Fatal for this attempt; a new invite is
    /// required.
    #[error("invalid handshake invite: {0}")]
    InvalidHandshake(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}
