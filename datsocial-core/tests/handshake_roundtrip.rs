//! End-to-end protocol tests over the public API.
//!
//! Two users share nothing but the swarm directory, mirroring two peer
//! processes coordinating only through the replicated store.

use datsocial_core::core_dat::{manifest, Dat};
use datsocial_core::{check_handshake, follow, handshake, Config, SocialError, User};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn shared_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.dat.swarm_dir = dir.path().join("swarm");
    config.dat.load_timeout = Duration::from_millis(500);
    config.dat.retry_backoff = Duration::from_millis(25);
    config
}

#[test]
fn setup_scenario_produces_readable_metadat() {
    let dir = TempDir::new().unwrap();
    let config = shared_config(&dir);
    let base = dir.path().join("setup-test");

    let mut user = User::setup(&config, &base, "jay", "arstarst").unwrap();
    user.close();

    let metadat = Dat::open(&base.join("public-metadat")).unwrap();
    let published = manifest::read_public(&metadat).unwrap();
    assert_eq!(published.name, "jay");
    assert!(published.dats.is_empty());
}

#[test]
fn create_dat_publishes_exactly_one_key() {
    let dir = TempDir::new().unwrap();
    let config = shared_config(&dir);
    let base = dir.path().join("create-dat-public");

    let mut user = User::setup(&config, &base, "jay", "arstarst").unwrap();
    let dat = user.create_dat("test", true).unwrap();

    assert!(base.join("dats").join("test").join("dat.json").exists());

    let metadat = Dat::open(&base.join("public-metadat")).unwrap();
    let published = manifest::read_public(&metadat).unwrap();
    assert_eq!(published.dats, vec![dat.key().to_hex()]);
}

#[test]
fn load_restores_fresh_identity_with_empty_state() {
    let dir = TempDir::new().unwrap();
    let config = shared_config(&dir);
    let base = dir.path().join("load-test");

    let mut created = User::setup(&config, &base, "jay", "arstarst").unwrap();
    let id = created.identity.id;
    created.close();

    let user = User::load(&config, &base, "arstarst").unwrap();
    assert_eq!(user.identity.id, id);
    assert!(user.manifest.dats.is_empty());
    assert!(user.private.follows.is_empty());
    assert!(user.private.relationships.is_empty());

    assert!(matches!(
        User::load(&config, &base, "wrong"),
        Err(SocialError::Identity(_))
    ));
}

#[tokio::test]
async fn follow_then_handshake_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = shared_config(&dir);

    let mut u1 = User::setup(&config, &dir.path().join("u1-base"), "u1", "arstarst").unwrap();
    let mut u2 = User::setup(&config, &dir.path().join("u2-base"), "u2", "arstarst").unwrap();

    // u2 checking before u1 has invited is a not-found, never a crypto error
    let early = check_handshake(&mut u2, u1.public_metadat_key()).await;
    assert!(matches!(early, Err(SocialError::HandshakeNotFound(_))));

    let peer = handshake(&mut u1, u2.public_metadat_key()).await.unwrap();
    assert_eq!(peer.id, u2.identity.id);

    // Arbitrarily later, u2 discovers and accepts the invite
    let initiator = check_handshake(&mut u2, u1.public_metadat_key())
        .await
        .unwrap();
    assert_eq!(initiator.id, u1.identity.id);

    // Both relationship records exist and reference a store both can open
    let p1: &PathBuf = &u1.private.relationships[&u2.identity.id];
    let p2: &PathBuf = &u2.private.relationships[&u1.identity.id];
    let d1 = Dat::open(p1).unwrap();
    let d2 = Dat::open(p2).unwrap();
    assert_eq!(d1.key(), d2.key());

    // The responder's published manifest carries the relationship entry
    let metadat = Dat::open(&dir.path().join("u2-base").join("public-metadat")).unwrap();
    let published = manifest::read_public(&metadat).unwrap();
    assert!(published.relationships.contains_key(&u1.identity.id));

    u1.close();
    u2.close();
}

#[tokio::test]
async fn state_survives_reload_between_phases() {
    let dir = TempDir::new().unwrap();
    let config = shared_config(&dir);

    let mut u1 = User::setup(&config, &dir.path().join("u1-base"), "u1", "arstarst").unwrap();
    let mut u2 = User::setup(&config, &dir.path().join("u2-base"), "u2", "arstarst").unwrap();

    handshake(&mut u1, u2.public_metadat_key()).await.unwrap();
    let u1_key = *u1.public_metadat_key();
    u1.close();
    u2.close();

    // The responder restarts from disk before discovering the invite
    let mut u2 = User::load(&config, &dir.path().join("u2-base"), "arstarst").unwrap();
    check_handshake(&mut u2, &u1_key).await.unwrap();

    // And the initiator's record is still there after its own restart
    let u1 = User::load(&config, &dir.path().join("u1-base"), "arstarst").unwrap();
    assert!(u1.private.relationships.contains_key(&u2.identity.id));
    assert!(u2.private.relationships.contains_key(&u1.identity.id));
}

#[tokio::test]
async fn follow_survives_and_stays_single() {
    let dir = TempDir::new().unwrap();
    let config = shared_config(&dir);

    let u2 = User::setup(&config, &dir.path().join("u2-base"), "u2", "arstarst").unwrap();
    let mut u1 = User::setup(&config, &dir.path().join("u1-base"), "u1", "arstarst").unwrap();

    let first = follow(&mut u1, u2.public_metadat_key()).await.unwrap();
    let second = follow(&mut u1, u2.public_metadat_key()).await.unwrap();
    assert_eq!(first.local_path, second.local_path);
    assert_eq!(u1.private.follows.len(), 1);
    assert!(first.local_path.join("user.json").exists());
}
