//! Follow engine
//!
//! A follow is a one-directional subscription: replicate the peer's public
//! metadat, derive the peer's fingerprint from the manifest it carries, and
//! keep a local snapshot under `follows/{name}-{id}`. The fingerprint is
//! the map key; the directory name is display-plus-fingerprint, so repeats
//! collide onto the same path and the operation is idempotent.
//!
//! No retry policy lives here: a transient load failure surfaces as
//! [`SocialError::PeerUnreachable`] and the caller decides when to retry.

use crate::core_dat::{manifest, Dat, DatError, DatKey};
use crate::core_identity::UserId;
use crate::core_social::{SocialError, User};
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Directory name for a peer's state: the display name reduced to a single
/// safe path component, suffixed with the fingerprint. The manifest `name`
/// is peer-controlled and must never influence where on disk we write or
/// delete, so everything outside `[A-Za-z0-9_-]` is stripped; a name with
/// nothing left falls back to the fingerprint alone.
pub(crate) fn peer_dir_name(name: &str, id: &UserId) -> String {
    let safe: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if safe.is_empty() {
        id.to_string()
    } else {
        format!("{}-{}", safe, id)
    }
}

/// What a follow learns about a peer
#[derive(Debug, Clone)]
pub struct PeerProfile {
    /// Peer's display name, as claimed in their manifest
    pub name: String,
    /// Fingerprint derived from the manifest public key
    pub id: UserId,
    /// Peer's identity public key
    pub pub_key: [u8; 32],
    /// Key of the peer's public metadat
    pub metadat_key: DatKey,
    /// Local snapshot directory
    pub local_path: PathBuf,
}

/// Subscribe to a peer's public metadat.
///
/// Loads the peer's dat, snapshots it under `follows/{name}-{id}`, and
/// records the follow in the user's private state. Following an
/// already-followed peer refreshes the snapshot in place.
pub async fn follow(user: &mut User, peer_metadat_key: &DatKey) -> Result<PeerProfile, SocialError> {
    // The deterministic directory name needs the peer's manifest, so the
    // replica lands in a staging directory first.
    let staging = user
        .follows_dir()
        .join(format!(".staging-{}", peer_metadat_key.to_hex()));

    let replica = user
        .registry
        .load(peer_metadat_key, &staging)
        .await
        .map_err(map_unreachable)?;
    let peer_manifest = manifest::read_public(&replica)?;

    let pub_key = peer_manifest.public_key_bytes()?;
    let peer_id = UserId::from_public_key(&pub_key);

    let local_path = user
        .follows_dir()
        .join(peer_dir_name(&peer_manifest.name, &peer_id));
    if local_path.exists() {
        fs::remove_dir_all(&local_path)?;
    }
    fs::rename(&staging, &local_path)?;

    // Reopen at the final path and point the registry at it
    let snapshot = Dat::open(&local_path)?;
    debug_assert_eq!(snapshot.key(), peer_metadat_key);
    user.registry.retarget(peer_metadat_key, &local_path);

    user.private.follows.insert(peer_id, local_path.clone());
    user.manifest
        .follows
        .insert(peer_id, peer_manifest.name.clone());
    user.persist()?;

    info!(user = %user.identity.id, peer = %peer_id, name = %peer_manifest.name, "following peer");

    Ok(PeerProfile {
        name: peer_manifest.name,
        id: peer_id,
        pub_key,
        metadat_key: *peer_metadat_key,
        local_path,
    })
}

fn map_unreachable(err: DatError) -> SocialError {
    match err {
        DatError::Unavailable(key) => SocialError::PeerUnreachable(key),
        other => SocialError::Dat(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::time::Duration;
    use tempfile::TempDir;

    fn shared_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.dat.swarm_dir = dir.path().join("swarm");
        config.dat.load_timeout = Duration::from_millis(300);
        config.dat.retry_backoff = Duration::from_millis(20);
        config
    }

    #[tokio::test]
    async fn test_follow_creates_snapshot() {
        let dir = TempDir::new().unwrap();
        let config = shared_config(&dir);

        let u2 = User::setup(&config, &dir.path().join("u2-base"), "u2", "arstarst").unwrap();
        let mut u1 = User::setup(&config, &dir.path().join("u1-base"), "u1", "arstarst").unwrap();

        let peer = follow(&mut u1, u2.public_metadat_key()).await.unwrap();

        assert_eq!(peer.id, u2.identity.id);
        assert_eq!(peer.name, "u2");

        let expected = dir
            .path()
            .join("u1-base")
            .join("follows")
            .join(format!("u2-{}", u2.identity.id));
        assert_eq!(peer.local_path, expected);
        assert!(expected.join("user.json").exists());
        assert_eq!(u1.private.follows.get(&peer.id), Some(&expected));
        assert_eq!(u1.manifest.follows.get(&peer.id), Some(&"u2".to_string()));
    }

    #[tokio::test]
    async fn test_follow_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let config = shared_config(&dir);

        let u2 = User::setup(&config, &dir.path().join("u2-base"), "u2", "arstarst").unwrap();
        let mut u1 = User::setup(&config, &dir.path().join("u1-base"), "u1", "arstarst").unwrap();

        let first = follow(&mut u1, u2.public_metadat_key()).await.unwrap();
        let second = follow(&mut u1, u2.public_metadat_key()).await.unwrap();

        assert_eq!(u1.private.follows.len(), 1);
        assert_eq!(first.local_path, second.local_path);
    }

    #[test]
    fn test_peer_dir_name_strips_path_syntax() {
        let id = UserId::from_public_key(&[5u8; 32]);
        assert_eq!(peer_dir_name("jay", &id), format!("jay-{}", id));
        assert_eq!(peer_dir_name("../../victim", &id), format!("victim-{}", id));
        assert_eq!(peer_dir_name("/..", &id), id.to_string());
    }

    #[tokio::test]
    async fn test_hostile_peer_name_cannot_escape_follows_dir() {
        let dir = TempDir::new().unwrap();
        let config = shared_config(&dir);

        let mut u2 = User::setup(&config, &dir.path().join("u2-base"), "u2", "arstarst").unwrap();
        u2.manifest.name = "../../victim".to_string();
        u2.persist().unwrap();

        // Plant a file where an unsanitized name would point the snapshot
        let outside = dir.path().join(format!("victim-{}", u2.identity.id));
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("precious.txt"), b"keep me").unwrap();

        let mut u1 = User::setup(&config, &dir.path().join("u1-base"), "u1", "arstarst").unwrap();
        let peer = follow(&mut u1, u2.public_metadat_key()).await.unwrap();

        let follows_dir = dir.path().join("u1-base").join("follows");
        assert_eq!(
            peer.local_path,
            follows_dir.join(format!("victim-{}", peer.id))
        );
        assert!(outside.join("precious.txt").exists());
    }

    #[tokio::test]
    async fn test_unreachable_peer() {
        let dir = TempDir::new().unwrap();
        let config = shared_config(&dir);

        let mut u1 = User::setup(&config, &dir.path().join("u1-base"), "u1", "arstarst").unwrap();

        let result = follow(&mut u1, &DatKey::generate()).await;
        assert!(matches!(result, Err(SocialError::PeerUnreachable(_))));
    }
}
