//! Handshake engine
//!
//! Two-phase establishment of a private relationship channel. The
//! initiator follows the peer, creates a relationship dat, and leaves a
//! sealed invite in its own public manifest; the responder discovers the
//! invite by reading the initiator's replicated manifest, opens it with
//! its private key, and joins the relationship dat. No channel beyond the
//! replicated store is needed, and the responder may check arbitrarily
//! later.
//!
//! Both phases are idempotent: everything is keyed by peer fingerprint
//! and the relationship directory name is deterministic, so re-running a
//! phase updates state in place instead of duplicating it.

use crate::core_dat::{manifest, Dat, DatError, DatKey, RelationshipEntry};
use crate::core_identity::{sealed, UserId};
use crate::core_social::follow::{follow, peer_dir_name, PeerProfile};
use crate::core_social::{SocialError, User};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use tracing::{debug, info};

/// Protocol phases, in order of progression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    /// Initiator has replicated the peer's manifest
    FollowingPeer,
    /// Relationship dat exists locally
    InvitePrepared,
    /// Sealed invite is published in the initiator's manifest
    InviteDelivered,
    /// Responder found an invite addressed to it
    InviteDiscovered,
    /// Responder joined the relationship dat
    RelationshipAccepted,
    Complete,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeState::Idle => "idle",
            HandshakeState::FollowingPeer => "following-peer",
            HandshakeState::InvitePrepared => "invite-prepared",
            HandshakeState::InviteDelivered => "invite-delivered",
            HandshakeState::InviteDiscovered => "invite-discovered",
            HandshakeState::RelationshipAccepted => "relationship-accepted",
            HandshakeState::Complete => "complete",
        };
        write!(f, "{}", name)
    }
}

/// Contents of a sealed invite: access material for the relationship dat
#[derive(Debug, Serialize, Deserialize)]
struct InvitePayload {
    relationship_key: DatKey,
    initiator: UserId,
}

/// Initiate a handshake with the peer whose public metadat is
/// `peer_metadat_key`.
///
/// On return the invite is durably published and the local relationship
/// record exists; the relationship completes whenever the peer runs
/// [`check_handshake`].
pub async fn handshake(user: &mut User, peer_metadat_key: &DatKey) -> Result<PeerProfile, SocialError> {
    let mut state = HandshakeState::Idle;

    let peer = follow(user, peer_metadat_key).await?;
    state = transition(user, state, HandshakeState::FollowingPeer);

    let rel_name = peer_dir_name(&peer.name, &peer.id);
    let rel_dir = user.relationships_dir().join(&rel_name);
    let rel_dat = if rel_dir.join("dat.json").exists() {
        // Repeat handshake: reuse the existing relationship dat
        user.registry.open_local(&rel_dir)?
    } else {
        user.registry.create(&user.relationships_dir(), &rel_name)?
    };
    state = transition(user, state, HandshakeState::InvitePrepared);

    let payload = InvitePayload {
        relationship_key: *rel_dat.key(),
        initiator: user.identity.id,
    };
    let payload_bytes =
        serde_json::to_vec(&payload).map_err(|e| SocialError::Serialization(e.to_string()))?;
    let blob = sealed::seal(&peer.pub_key, &payload_bytes)?;

    let blob_ref = format!("handshakes/{}.blob", peer.id);
    user.metadat().write_entry(&blob_ref, &blob)?;
    user.manifest.handshakes.insert(peer.id, blob_ref);
    state = transition(user, state, HandshakeState::InviteDelivered);

    user.manifest.relationships.insert(
        peer.id,
        RelationshipEntry {
            path: rel_dir.display().to_string(),
        },
    );
    user.private.relationships.insert(peer.id, rel_dir);
    user.persist()?;

    transition(user, state, HandshakeState::Complete);
    info!(user = %user.identity.id, peer = %peer.id, "handshake initiated");
    Ok(peer)
}

/// Check the initiator's manifest for an invite addressed to this user
/// and, if present, accept it.
///
/// Absence of an invite is a [`SocialError::HandshakeNotFound`]: the
/// initiator's write may simply not have replicated yet, so the caller is
/// free to re-poll. A blob that cannot be opened or parsed is fatal for
/// the attempt ([`SocialError::InvalidHandshake`]).
pub async fn check_handshake(
    user: &mut User,
    initiator_metadat_key: &DatKey,
) -> Result<PeerProfile, SocialError> {
    let mut state = HandshakeState::Idle;

    let peer = follow(user, initiator_metadat_key).await?;
    state = transition(user, state, HandshakeState::FollowingPeer);

    let snapshot = Dat::open(&peer.local_path)?;
    let peer_manifest = manifest::read_public(&snapshot)?;

    let blob_ref = peer_manifest
        .handshakes
        .get(&user.identity.id)
        .ok_or(SocialError::HandshakeNotFound(user.identity.id))?;
    // The ref is peer-controlled; only plain paths inside the snapshot's
    // handshakes directory are acceptable.
    if !blob_ref.starts_with("handshakes/") || blob_ref.contains("..") {
        return Err(SocialError::InvalidHandshake(
            "invite blob reference escapes the handshake directory".to_string(),
        ));
    }
    state = transition(user, state, HandshakeState::InviteDiscovered);

    let blob = snapshot.read_entry(blob_ref).map_err(|e| match e {
        DatError::NotFound(_) => {
            SocialError::InvalidHandshake("manifest references a missing invite blob".to_string())
        }
        other => SocialError::Dat(other),
    })?;

    let payload_bytes = sealed::open(user.identity.keypair(), &blob)
        .map_err(|_| SocialError::InvalidHandshake("invite was not sealed for this identity".to_string()))?;
    let payload: InvitePayload = serde_json::from_slice(&payload_bytes)
        .map_err(|e| SocialError::InvalidHandshake(format!("malformed invite payload: {}", e)))?;
    if payload.initiator != peer.id {
        return Err(SocialError::InvalidHandshake(
            "invite initiator does not match manifest owner".to_string(),
        ));
    }

    let rel_dir = user
        .relationships_dir()
        .join(peer_dir_name(&peer.name, &peer.id));

    // Mutual initiation: both sides may hold an own-initiated relationship
    // for the same pair. The larger fingerprint yields to the smaller
    // initiator's dat, so both peers converge on one store.
    if user.private.relationships.contains_key(&peer.id) {
        let existing_key = Dat::open(&rel_dir).map(|d| *d.key()).ok();
        if existing_key == Some(payload.relationship_key) {
            // Already accepted this exact relationship; nothing to redo
            debug!(user = %user.identity.id, peer = %peer.id, "relationship already accepted");
            transition(user, state, HandshakeState::Complete);
            return Ok(peer);
        }
        if user.identity.id < peer.id {
            debug!(user = %user.identity.id, peer = %peer.id,
                "mutual initiation, keeping own relationship dat");
            transition(user, state, HandshakeState::Complete);
            return Ok(peer);
        }
        // Yield: retract the abandoned dat and its invite, then replace the
        // own-initiated dat with the peer's
        if let Some(key) = existing_key {
            user.registry.retract(&key)?;
        }
        user.manifest.handshakes.remove(&peer.id);
        fs::remove_dir_all(&rel_dir)?;
    }

    user.registry
        .load(&payload.relationship_key, &rel_dir)
        .await
        .map_err(|e| match e {
            DatError::Unavailable(key) => SocialError::PeerUnreachable(key),
            other => SocialError::Dat(other),
        })?;
    state = transition(user, state, HandshakeState::RelationshipAccepted);

    user.manifest.relationships.insert(
        peer.id,
        RelationshipEntry {
            path: rel_dir.display().to_string(),
        },
    );
    user.private.relationships.insert(peer.id, rel_dir);
    user.persist()?;

    transition(user, state, HandshakeState::Complete);
    info!(user = %user.identity.id, peer = %peer.id, "handshake accepted");
    Ok(peer)
}

fn transition(user: &User, from: HandshakeState, to: HandshakeState) -> HandshakeState {
    debug!(user = %user.identity.id, %from, %to, "handshake state");
    to
}
