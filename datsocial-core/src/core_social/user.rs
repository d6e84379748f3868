//! The user aggregate
//!
//! A [`User`] combines a loaded identity, the write handle to its public
//! metadat, the local private state, and the dat registry. Every engine
//! operates on this aggregate; it is the single writer of its own manifest
//! by construction, so readers elsewhere only ever see snapshots.

use crate::config::Config;
use crate::core_dat::{
    manifest, Dat, DatKey, DatRegistry, PrivateState, PublicManifest,
};
use crate::core_identity::{keystore, Identity};
use crate::core_social::SocialError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Logical name of the public metadat
const PUBLIC_METADAT: &str = "public-metadat";

/// In-memory representation of a local user
pub struct User {
    /// Loaded identity (keypair + fingerprint)
    pub identity: Identity,
    /// Root of this user's on-disk state
    pub base_dir: PathBuf,
    /// Owner-writable copy of the public manifest
    pub manifest: PublicManifest,
    /// Local follow/relationship bookkeeping
    pub private: PrivateState,
    pub(crate) registry: DatRegistry,
    public_metadat: Dat,
}

impl User {
    /// Create a fresh identity and its public metadat under `path`.
    pub fn setup(
        config: &Config,
        path: &Path,
        name: &str,
        passphrase: &str,
    ) -> Result<Self, SocialError> {
        let identity = keystore::setup(path, name, passphrase, config.identity.num_bits)?;

        let mut registry = DatRegistry::new(&config.dat)?;
        let public_metadat = registry.create(path, PUBLIC_METADAT)?;

        let manifest = PublicManifest::new(name, identity.public_key());
        manifest::write_public(&public_metadat, &manifest)?;

        let private = PrivateState::default();
        private.save(path)?;

        info!(user = %identity.id, metadat = %public_metadat.key(), "user set up");

        Ok(User {
            identity,
            base_dir: path.to_path_buf(),
            manifest,
            private,
            registry,
            public_metadat,
        })
    }

    /// Load an existing user from `path`, decrypting the identity with
    /// `passphrase`.
    pub fn load(config: &Config, path: &Path, passphrase: &str) -> Result<Self, SocialError> {
        let identity = keystore::load(path, passphrase)?;

        let mut registry = DatRegistry::new(&config.dat)?;
        let public_metadat = registry.open_local(&path.join(PUBLIC_METADAT))?;

        let manifest = manifest::read_public(&public_metadat)?;
        let private = PrivateState::load(path)?;

        debug!(user = %identity.id, "user loaded");

        Ok(User {
            identity,
            base_dir: path.to_path_buf(),
            manifest,
            private,
            registry,
            public_metadat,
        })
    }

    /// Create a new content dat under `dats/{name}`.
    ///
    /// If `public`, its key is published in the manifest.
    pub fn create_dat(&mut self, name: &str, public: bool) -> Result<Dat, SocialError> {
        let dat = self.registry.create(&self.base_dir.join("dats"), name)?;

        if public {
            self.manifest.add_dat(dat.key().to_hex());
            manifest::write_public(&self.public_metadat, &self.manifest)?;
        }

        info!(user = %self.identity.id, name, key = %dat.key(), public, "dat created");
        Ok(dat)
    }

    /// Key of the public metadat; this is what peers follow and handshake
    /// against.
    pub fn public_metadat_key(&self) -> &DatKey {
        self.public_metadat.key()
    }

    /// Write handle to the public metadat
    pub(crate) fn metadat(&self) -> &Dat {
        &self.public_metadat
    }

    pub(crate) fn follows_dir(&self) -> PathBuf {
        self.base_dir.join("follows")
    }

    pub(crate) fn relationships_dir(&self) -> PathBuf {
        self.base_dir.join("relationships")
    }

    /// Persist the manifest and private state
    pub fn persist(&mut self) -> Result<(), SocialError> {
        manifest::write_public(&self.public_metadat, &self.manifest)?;
        self.private.save(&self.base_dir)?;
        debug!(user = %self.identity.id, "state persisted");
        Ok(())
    }

    /// Close the metadat handle and drop registry bookkeeping. Idempotent;
    /// the on-disk state stays loadable.
    pub fn close(&mut self) {
        self.registry.close(&mut self.public_metadat);
        self.registry.clear();
    }
}
