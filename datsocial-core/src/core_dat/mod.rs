//! Dat layer
//!
//! A dat is an append-only, independently replicable content container
//! identified by a public key. This module provides the local store
//! implementation ([`Dat`]), the registry that creates/loads/closes them
//! ([`DatRegistry`]), and the manifest records persisted inside the public
//! dat ([`PublicManifest`]) and locally ([`PrivateState`]).

pub mod dat;
pub mod errors;
pub mod manifest;
pub mod registry;

pub use dat::{Dat, DatKey, LogEntry};
pub use errors::DatError;
pub use manifest::{
    read_public, write_public, PrivateState, PublicManifest, RelationshipEntry, MANIFEST_ENTRY,
};
pub use registry::DatRegistry;
