//! datsocial-core: decentralized identity and trust establishment over
//! replicated append-only stores ("dats").
//!
//! A user owns a passphrase-protected keypair, a public metadat (a dat
//! carrying their manifest), and a set of follow and relationship dats.
//! Peers coordinate only through the replicated store: a follow copies a
//! peer's public manifest, a handshake plants an encrypted invite in the
//! initiator's manifest for the responder to discover and accept.

pub mod config;
pub mod core_dat;
pub mod core_identity;
pub mod core_social;
pub mod logging;

pub use config::Config;
pub use core_dat::{Dat, DatError, DatKey, DatRegistry, PrivateState, PublicManifest};
pub use core_identity::{Identity, IdentityError, Keypair, UserId};
pub use core_social::{
    check_handshake, follow, handshake, HandshakeState, PeerProfile, SocialError, User,
};
pub use logging::{init_logging, LogLevel};
