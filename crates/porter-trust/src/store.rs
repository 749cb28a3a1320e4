//! Trust store operations.
//!
//! Every mutation follows the same discipline: read the peer's meta record,
//! apply the change in memory, and write it back with a compare-and-set
//! keyed on the version that was read. A lost race reloads and retries up
//! to [`CAS_MAX_ATTEMPTS`] times, then surfaces
//! [`TrustStoreError::Conflict`]. Losing the race never corrupts state —
//! at worst, a retry.

use crate::digest::{credential_digest, digest_bytes, digest_matches};
use crate::error::TrustStoreError;
use crate::model::{
    AddPeerRequest, CredentialCheck, InvalidReason, KeyRotation, Peer, PeerKey, StalenessEntry,
    StalenessReason,
};
use crate::paths;
use chrono::{DateTime, Utc};
use porter_db::{kv, KvError};
use porter_types::{KeyStatus, PeerStatus};
use rusqlite::Connection;
use uuid::Uuid;

/// How many times a mutation retries its compare-and-set before giving up.
const CAS_MAX_ATTEMPTS: usize = 4;

fn now_rfc3339() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn make_key_id(seq: u64) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("k-{seq:06}-{}", &suffix[..8])
}

fn load_peer(conn: &Connection, peer_id: &str) -> Result<Option<Peer>, TrustStoreError> {
    match kv::get(conn, &paths::peer_meta(peer_id))? {
        Some(entry) => {
            let mut peer: Peer = serde_json::from_str(&entry.value)?;
            peer.version = entry.version;
            Ok(Some(peer))
        }
        None => Ok(None),
    }
}

/// Reads a single peer, or `None` if it does not exist.
pub fn get_peer(conn: &Connection, peer_id: &str) -> Result<Option<Peer>, TrustStoreError> {
    load_peer(conn, peer_id)
}

/// Read-modify-CAS loop shared by all peer mutations.
///
/// The closure sees the freshly loaded record on every attempt, so a retry
/// after a lost race re-applies the change against current state.
fn mutate_peer<T, F>(
    conn: &Connection,
    peer_id: &str,
    mut apply: F,
) -> Result<(Peer, T), TrustStoreError>
where
    F: FnMut(&mut Peer) -> Result<T, TrustStoreError>,
{
    for _ in 0..CAS_MAX_ATTEMPTS {
        let mut peer =
            load_peer(conn, peer_id)?.ok_or_else(|| TrustStoreError::NotFound(peer_id.into()))?;
        let base_version = peer.version;

        let outcome = apply(&mut peer)?;
        peer.updated_at = now_rfc3339();
        // CAS bumps the entry version to base + 1; keep the stored copy equal.
        peer.version = base_version + 1;

        let value = serde_json::to_string(&peer)?;
        match kv::compare_and_set(conn, &paths::peer_meta(peer_id), &value, base_version, None) {
            Ok(new_version) => {
                peer.version = new_version;
                return Ok((peer, outcome));
            }
            Err(KvError::VersionMismatch { .. }) => {
                tracing::debug!(peer_id, base_version, "peer CAS lost, retrying");
                continue;
            }
            Err(KvError::NotFound(_)) => {
                return Err(TrustStoreError::NotFound(peer_id.into()));
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(TrustStoreError::Conflict(peer_id.into()))
}

/// Creates a peer in `pending` status with exactly one active key.
///
/// The raw credential is digested immediately and never stored. Fails with
/// [`TrustStoreError::AlreadyExists`] if the peer id is taken — an existing
/// record is never overwritten.
pub fn add_peer(conn: &Connection, req: AddPeerRequest) -> Result<Peer, TrustStoreError> {
    if !paths::valid_peer_id(&req.peer_id) {
        return Err(TrustStoreError::InvalidPeerId(req.peer_id));
    }

    let now = now_rfc3339();
    let key_id = make_key_id(1);
    let mut peer = Peer {
        peer_id: req.peer_id.clone(),
        display_name: req.display_name,
        endpoints: req.endpoints,
        status: PeerStatus::Pending,
        labels: req.labels,
        annotations: req.annotations,
        last_contact: None,
        created_at: now.clone(),
        updated_at: now.clone(),
        key_seq: 1,
        version: 1,
    };

    let meta_value = serde_json::to_string(&peer)?;
    match kv::insert(conn, &paths::peer_meta(&req.peer_id), &meta_value, None) {
        Ok(version) => peer.version = version,
        Err(KvError::AlreadyExists(_)) => {
            return Err(TrustStoreError::AlreadyExists(req.peer_id));
        }
        Err(e) => return Err(e.into()),
    }

    let key = PeerKey {
        key_id: key_id.clone(),
        credential_digest: credential_digest(&req.credential),
        status: KeyStatus::Active,
        created_at: now,
        expires_at: None,
        retired_at: None,
    };
    kv::insert(
        conn,
        &paths::peer_key(&req.peer_id, &key_id),
        &serde_json::to_string(&key)?,
        None,
    )?;

    tracing::info!(peer_id = %peer.peer_id, key_id = %key_id, "peer created");
    Ok(peer)
}

/// Transitions a peer from `pending` to `active`.
///
/// Calling on an already-active peer is an idempotent no-op success.
/// Activating a revoked peer is an illegal transition.
pub fn activate_peer(conn: &Connection, peer_id: &str) -> Result<Peer, TrustStoreError> {
    let (peer, _) = mutate_peer(conn, peer_id, |peer| {
        if !peer.status.can_transition_to(PeerStatus::Active) {
            return Err(TrustStoreError::IllegalTransition {
                from: peer.status,
                to: PeerStatus::Active,
            });
        }
        peer.status = PeerStatus::Active;
        Ok(())
    })?;
    tracing::info!(peer_id, "peer activated");
    Ok(peer)
}

/// Transitions a peer to `revoked` from any status. Idempotent.
pub fn revoke_peer(conn: &Connection, peer_id: &str) -> Result<Peer, TrustStoreError> {
    let (peer, _) = mutate_peer(conn, peer_id, |peer| {
        peer.status = PeerStatus::Revoked;
        Ok(())
    })?;
    tracing::info!(peer_id, "peer revoked");
    Ok(peer)
}

/// Explicit operator downgrade driven by staleness review.
///
/// `hard = false` moves `active → pending`; `hard = true` moves
/// `active → revoked`. Only active peers can be downgraded.
pub fn downgrade_trust(
    conn: &Connection,
    peer_id: &str,
    hard: bool,
) -> Result<Peer, TrustStoreError> {
    let target = if hard {
        PeerStatus::Revoked
    } else {
        PeerStatus::Pending
    };
    let (peer, _) = mutate_peer(conn, peer_id, |peer| {
        if peer.status != PeerStatus::Active {
            return Err(TrustStoreError::IllegalTransition {
                from: peer.status,
                to: target,
            });
        }
        peer.status = target;
        Ok(())
    })?;
    tracing::info!(peer_id, hard, new_status = peer.status.as_str(), "peer downgraded");
    Ok(peer)
}

/// Adds a new active key and, when `old_key_id` is given, marks that key
/// `retiring` — it keeps authenticating until [`cleanup_retiring_keys`]
/// removes it. Rotation never deletes a key. Naming an `old_key_id` the
/// peer does not hold is an [`TrustStoreError::UnknownKey`] error, caught
/// before anything is written.
pub fn rotate_key(
    conn: &Connection,
    peer_id: &str,
    new_credential: &str,
    old_key_id: Option<&str>,
) -> Result<KeyRotation, TrustStoreError> {
    if let Some(old_id) = old_key_id {
        if kv::get(conn, &paths::peer_key(peer_id, old_id))?.is_none() {
            return Err(TrustStoreError::UnknownKey {
                peer_id: peer_id.into(),
                key_id: old_id.into(),
            });
        }
    }

    // Bump the generation counter under the peer CAS so concurrent rotations
    // serialize and key ids stay generation-ordered.
    let (_, new_seq) = mutate_peer(conn, peer_id, |peer| {
        peer.key_seq += 1;
        Ok(peer.key_seq)
    })?;

    let now = now_rfc3339();
    let new_key_id = make_key_id(new_seq);
    let key = PeerKey {
        key_id: new_key_id.clone(),
        credential_digest: credential_digest(new_credential),
        status: KeyStatus::Active,
        created_at: now.clone(),
        expires_at: None,
        retired_at: None,
    };
    kv::insert(
        conn,
        &paths::peer_key(peer_id, &new_key_id),
        &serde_json::to_string(&key)?,
        None,
    )?;

    // Re-read after the CAS; a concurrent delete between the precheck and
    // here just leaves nothing to retire.
    let mut retired = None;
    if let Some(old_id) = old_key_id {
        if let Some(entry) = kv::get(conn, &paths::peer_key(peer_id, old_id))? {
            let mut old: PeerKey = serde_json::from_str(&entry.value)?;
            if old.status == KeyStatus::Active {
                old.status = KeyStatus::Retiring;
                old.retired_at = Some(now.clone());
                kv::put(
                    conn,
                    &paths::peer_key(peer_id, old_id),
                    &serde_json::to_string(&old)?,
                    None,
                )?;
            }
            retired = Some(old_id.to_string());
        }
    }

    tracing::info!(
        peer_id,
        new_key_id = %new_key_id,
        old_key_id = retired.as_deref().unwrap_or("-"),
        "key rotated"
    );
    Ok(KeyRotation {
        new_key_id,
        overlap_required: retired.is_some(),
        old_key_id: retired,
    })
}

/// Hard-removes retiring keys whose overlap window has run its course.
///
/// This is the explicit cleanup half of rotation — nothing in this crate
/// removes a retiring key on a timer. `older_than_days = 0` removes every
/// retiring key.
pub fn cleanup_retiring_keys(
    conn: &Connection,
    peer_id: &str,
    older_than_days: u32,
) -> Result<usize, TrustStoreError> {
    if load_peer(conn, peer_id)?.is_none() {
        return Err(TrustStoreError::NotFound(peer_id.into()));
    }

    let cutoff = Utc::now() - chrono::Duration::days(i64::from(older_than_days));
    let mut removed = 0;
    for (key_path, entry) in kv::list_prefix(conn, &paths::peer_keys_prefix(peer_id))? {
        let key: PeerKey = serde_json::from_str(&entry.value)?;
        if key.status != KeyStatus::Retiring {
            continue;
        }
        let old_enough = match key.retired_at.as_deref().and_then(parse_rfc3339) {
            Some(retired_at) => retired_at <= cutoff,
            // Retiring without a timestamp should not happen; treat as old.
            None => true,
        };
        if old_enough && kv::delete(conn, &key_path)? {
            tracing::info!(peer_id, key_id = %key.key_id, "retiring key removed");
            removed += 1;
        }
    }
    Ok(removed)
}

/// Lists a peer's keys, ordered by key id (and therefore by generation).
pub fn list_keys(conn: &Connection, peer_id: &str) -> Result<Vec<PeerKey>, TrustStoreError> {
    let mut keys = Vec::new();
    for (_, entry) in kv::list_prefix(conn, &paths::peer_keys_prefix(peer_id))? {
        keys.push(serde_json::from_str(&entry.value)?);
    }
    Ok(keys)
}

/// Checks a presented bearer secret against a peer's live keys.
///
/// Fails closed: a peer that is not `active` is invalid regardless of key
/// material. Digest comparison is constant-time; expired keys never match.
pub fn validate_credential(
    conn: &Connection,
    peer_id: &str,
    presented_secret: &str,
) -> Result<CredentialCheck, TrustStoreError> {
    let peer = match load_peer(conn, peer_id)? {
        Some(peer) => peer,
        None => {
            return Ok(CredentialCheck::Invalid {
                reason: InvalidReason::UnknownPeer,
            })
        }
    };
    if peer.status != PeerStatus::Active {
        return Ok(CredentialCheck::Invalid {
            reason: InvalidReason::PeerNotActive,
        });
    }

    let presented_bytes = digest_bytes(presented_secret);
    let now = now_rfc3339();

    for key in list_keys(conn, peer_id)? {
        if !key.status.authenticates() {
            continue;
        }
        if matches!(&key.expires_at, Some(exp) if exp.as_str() <= now.as_str()) {
            continue;
        }
        if digest_matches(&presented_bytes, &key.credential_digest) {
            return Ok(CredentialCheck::Valid {
                key_id: key.key_id,
                key_status: key.status,
            });
        }
    }

    Ok(CredentialCheck::Invalid {
        reason: InvalidReason::NoMatchingKey,
    })
}

/// Records a successful authenticated exchange.
///
/// Bumps `last_contact`, `updated_at`, and the version.
pub fn record_contact(conn: &Connection, peer_id: &str) -> Result<(), TrustStoreError> {
    mutate_peer(conn, peer_id, |peer| {
        peer.last_contact = Some(now_rfc3339());
        Ok(())
    })?;
    Ok(())
}

/// Lists peers, optionally filtered by status. Order follows the key space;
/// it is not guaranteed stable across calls.
pub fn list_peers(
    conn: &Connection,
    status_filter: Option<PeerStatus>,
) -> Result<Vec<Peer>, TrustStoreError> {
    let mut peers = Vec::new();
    for (key, entry) in kv::list_prefix(conn, paths::PEERS_PREFIX)? {
        if !key.ends_with("/meta") {
            continue;
        }
        let mut peer: Peer = serde_json::from_str(&entry.value)?;
        peer.version = entry.version;
        if status_filter.is_none_or(|s| peer.status == s) {
            peers.push(peer);
        }
    }
    Ok(peers)
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Advisory staleness report over active peers.
///
/// A peer is listed when its `last_contact` is absent (`never_contacted`)
/// or older than `threshold_days` (`stale`). Never mutates anything.
pub fn check_staleness(
    conn: &Connection,
    threshold_days: u32,
) -> Result<Vec<StalenessEntry>, TrustStoreError> {
    let now = Utc::now();
    let mut report = Vec::new();

    for peer in list_peers(conn, Some(PeerStatus::Active))? {
        match peer.last_contact.as_deref().and_then(parse_rfc3339) {
            None => report.push(StalenessEntry {
                peer,
                days_since_contact: None,
                reason: StalenessReason::NeverContacted,
            }),
            Some(last) => {
                let days = now.signed_duration_since(last).num_days();
                if days > i64::from(threshold_days) {
                    report.push(StalenessEntry {
                        peer,
                        days_since_contact: Some(days),
                        reason: StalenessReason::Stale,
                    });
                }
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use porter_db::run_migrations;
    use std::collections::BTreeMap;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn add(conn: &Connection, peer_id: &str, credential: &str) -> Peer {
        add_peer(
            conn,
            AddPeerRequest {
                peer_id: peer_id.into(),
                display_name: peer_id.to_uppercase(),
                endpoints: vec![format!("https://{peer_id}/inbox")],
                credential: credential.into(),
                labels: BTreeMap::new(),
                annotations: BTreeMap::new(),
            },
        )
        .unwrap()
    }

    /// Rewrites a peer's stored `last_contact`, bypassing the public API, so
    /// staleness tests can fabricate history.
    fn backdate_contact(conn: &Connection, peer_id: &str, days_ago: i64) {
        let entry = kv::get(conn, &paths::peer_meta(peer_id)).unwrap().unwrap();
        let mut json: serde_json::Value = serde_json::from_str(&entry.value).unwrap();
        let when = (Utc::now() - chrono::Duration::days(days_ago))
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();
        json["last_contact"] = serde_json::Value::String(when);
        kv::compare_and_set(
            conn,
            &paths::peer_meta(peer_id),
            &json.to_string(),
            entry.version,
            None,
        )
        .unwrap();
    }

    #[test]
    fn full_lifecycle_scenario() {
        let conn = setup();

        let peer = add(&conn, "a.example", "secret123-secret123");
        assert_eq!(peer.status, PeerStatus::Pending);
        assert_eq!(list_keys(&conn, "a.example").unwrap().len(), 1);

        // Pending peers fail closed even with the right secret
        assert_eq!(
            validate_credential(&conn, "a.example", "secret123-secret123").unwrap(),
            CredentialCheck::Invalid {
                reason: InvalidReason::PeerNotActive
            }
        );

        let peer = activate_peer(&conn, "a.example").unwrap();
        assert_eq!(peer.status, PeerStatus::Active);

        match validate_credential(&conn, "a.example", "secret123-secret123").unwrap() {
            CredentialCheck::Valid { key_status, .. } => {
                assert_eq!(key_status, KeyStatus::Active);
            }
            other => panic!("expected valid credential, got {other:?}"),
        }

        let peer = revoke_peer(&conn, "a.example").unwrap();
        assert_eq!(peer.status, PeerStatus::Revoked);

        // Previously-valid credential is invalid immediately after revocation
        assert_eq!(
            validate_credential(&conn, "a.example", "secret123-secret123").unwrap(),
            CredentialCheck::Invalid {
                reason: InvalidReason::PeerNotActive
            }
        );
    }

    #[test]
    fn add_peer_twice_reports_already_exists_without_mutation() {
        let conn = setup();
        add(&conn, "a.example", "first-secret");

        let err = add_peer(
            &conn,
            AddPeerRequest {
                peer_id: "a.example".into(),
                display_name: "Imposter".into(),
                endpoints: vec![],
                credential: "other-secret".into(),
                labels: BTreeMap::new(),
                annotations: BTreeMap::new(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, TrustStoreError::AlreadyExists(_)));

        let peer = get_peer(&conn, "a.example").unwrap().unwrap();
        assert_eq!(peer.display_name, "A.EXAMPLE");
        assert_eq!(list_keys(&conn, "a.example").unwrap().len(), 1);
    }

    #[test]
    fn invalid_peer_id_rejected() {
        let conn = setup();
        let err = add_peer(
            &conn,
            AddPeerRequest {
                peer_id: "Bad/Peer".into(),
                display_name: "x".into(),
                endpoints: vec![],
                credential: "s".into(),
                labels: BTreeMap::new(),
                annotations: BTreeMap::new(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, TrustStoreError::InvalidPeerId(_)));
    }

    #[test]
    fn activate_is_idempotent_but_illegal_from_revoked() {
        let conn = setup();
        add(&conn, "a.example", "s");
        activate_peer(&conn, "a.example").unwrap();

        // Second activation is a no-op success
        let peer = activate_peer(&conn, "a.example").unwrap();
        assert_eq!(peer.status, PeerStatus::Active);

        revoke_peer(&conn, "a.example").unwrap();
        let err = activate_peer(&conn, "a.example").unwrap_err();
        assert!(matches!(err, TrustStoreError::IllegalTransition { .. }));

        // Revoking twice succeeds without error
        revoke_peer(&conn, "a.example").unwrap();
    }

    #[test]
    fn rotation_keeps_old_credential_valid_until_cleanup() {
        let conn = setup();
        add(&conn, "a.example", "old-secret");
        activate_peer(&conn, "a.example").unwrap();

        let old_key_id = list_keys(&conn, "a.example").unwrap()[0].key_id.clone();
        let rotation =
            rotate_key(&conn, "a.example", "new-secret", Some(&old_key_id)).unwrap();
        assert_eq!(rotation.old_key_id.as_deref(), Some(old_key_id.as_str()));
        assert!(rotation.overlap_required);
        assert_ne!(rotation.new_key_id, old_key_id);

        // Both credentials authenticate during the overlap window
        match validate_credential(&conn, "a.example", "old-secret").unwrap() {
            CredentialCheck::Valid { key_status, .. } => {
                assert_eq!(key_status, KeyStatus::Retiring);
            }
            other => panic!("old credential should still be valid, got {other:?}"),
        }
        assert!(matches!(
            validate_credential(&conn, "a.example", "new-secret").unwrap(),
            CredentialCheck::Valid { .. }
        ));

        // Explicit cleanup ends the overlap
        let removed = cleanup_retiring_keys(&conn, "a.example", 0).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            validate_credential(&conn, "a.example", "old-secret").unwrap(),
            CredentialCheck::Invalid {
                reason: InvalidReason::NoMatchingKey
            }
        );
        assert!(matches!(
            validate_credential(&conn, "a.example", "new-secret").unwrap(),
            CredentialCheck::Valid { .. }
        ));
    }

    #[test]
    fn cleanup_respects_age_bound() {
        let conn = setup();
        add(&conn, "a.example", "old-secret");
        let old_key_id = list_keys(&conn, "a.example").unwrap()[0].key_id.clone();
        rotate_key(&conn, "a.example", "new-secret", Some(&old_key_id)).unwrap();

        // Freshly retired: a 7-day bound removes nothing
        assert_eq!(cleanup_retiring_keys(&conn, "a.example", 7).unwrap(), 0);
        assert_eq!(list_keys(&conn, "a.example").unwrap().len(), 2);
    }

    #[test]
    fn rotation_key_ids_are_generation_ordered() {
        let conn = setup();
        add(&conn, "a.example", "s0");
        let r1 = rotate_key(&conn, "a.example", "s1", None).unwrap();
        let r2 = rotate_key(&conn, "a.example", "s2", None).unwrap();
        assert!(r1.new_key_id < r2.new_key_id);
        assert!(!r1.overlap_required);
    }

    #[test]
    fn rotating_against_missing_old_key_is_refused_without_writes() {
        let conn = setup();
        add(&conn, "a.example", "s0");

        let err = rotate_key(&conn, "a.example", "s1", Some("k-999999-none")).unwrap_err();
        assert!(matches!(
            err,
            TrustStoreError::UnknownKey { ref key_id, .. } if key_id == "k-999999-none"
        ));

        // Nothing was inserted and the generation counter did not move.
        assert_eq!(list_keys(&conn, "a.example").unwrap().len(), 1);
        assert_eq!(get_peer(&conn, "a.example").unwrap().unwrap().key_seq, 1);
    }

    #[test]
    fn validate_unknown_peer_is_invalid() {
        let conn = setup();
        assert_eq!(
            validate_credential(&conn, "ghost.example", "anything").unwrap(),
            CredentialCheck::Invalid {
                reason: InvalidReason::UnknownPeer
            }
        );
    }

    #[test]
    fn expired_key_never_matches() {
        let conn = setup();
        add(&conn, "a.example", "s0");
        activate_peer(&conn, "a.example").unwrap();

        // Expire the key in place
        let key_id = list_keys(&conn, "a.example").unwrap()[0].key_id.clone();
        let path = paths::peer_key("a.example", &key_id);
        let entry = kv::get(&conn, &path).unwrap().unwrap();
        let mut key: PeerKey = serde_json::from_str(&entry.value).unwrap();
        key.expires_at = Some("2000-01-01T00:00:00Z".into());
        kv::put(&conn, &path, &serde_json::to_string(&key).unwrap(), None).unwrap();

        assert_eq!(
            validate_credential(&conn, "a.example", "s0").unwrap(),
            CredentialCheck::Invalid {
                reason: InvalidReason::NoMatchingKey
            }
        );
    }

    #[test]
    fn record_contact_bumps_version_and_timestamp() {
        let conn = setup();
        let before = add(&conn, "a.example", "s");
        record_contact(&conn, "a.example").unwrap();

        let after = get_peer(&conn, "a.example").unwrap().unwrap();
        assert!(after.last_contact.is_some());
        assert!(after.version > before.version);
    }

    #[test]
    fn list_peers_filters_by_status() {
        let conn = setup();
        add(&conn, "a.example", "s");
        add(&conn, "b.example", "s");
        activate_peer(&conn, "b.example").unwrap();

        assert_eq!(list_peers(&conn, None).unwrap().len(), 2);
        let active = list_peers(&conn, Some(PeerStatus::Active)).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].peer_id, "b.example");
    }

    #[test]
    fn staleness_report_thresholds() {
        let conn = setup();
        for id in ["stale.example", "fresh.example", "quiet.example"] {
            add(&conn, id, "s");
            activate_peer(&conn, id).unwrap();
        }
        backdate_contact(&conn, "stale.example", 45);
        backdate_contact(&conn, "fresh.example", 1);

        let report = check_staleness(&conn, 30).unwrap();
        assert_eq!(report.len(), 2);

        let stale = report
            .iter()
            .find(|e| e.peer.peer_id == "stale.example")
            .expect("45-day-old contact must be reported");
        assert_eq!(stale.reason, StalenessReason::Stale);
        assert!(stale.days_since_contact.unwrap() >= 45);

        let quiet = report
            .iter()
            .find(|e| e.peer.peer_id == "quiet.example")
            .expect("never-contacted active peer must be reported");
        assert_eq!(quiet.reason, StalenessReason::NeverContacted);
        assert!(quiet.days_since_contact.is_none());

        assert!(
            !report.iter().any(|e| e.peer.peer_id == "fresh.example"),
            "peer contacted yesterday must be excluded"
        );
    }

    #[test]
    fn downgrade_soft_and_hard() {
        let conn = setup();
        add(&conn, "a.example", "s");
        activate_peer(&conn, "a.example").unwrap();

        let peer = downgrade_trust(&conn, "a.example", false).unwrap();
        assert_eq!(peer.status, PeerStatus::Pending);

        // Downgrade is only defined from active
        let err = downgrade_trust(&conn, "a.example", true).unwrap_err();
        assert!(matches!(err, TrustStoreError::IllegalTransition { .. }));

        activate_peer(&conn, "a.example").unwrap();
        let peer = downgrade_trust(&conn, "a.example", true).unwrap();
        assert_eq!(peer.status, PeerStatus::Revoked);
    }

    #[test]
    fn stale_cas_write_loses_to_interleaved_mutation() {
        let conn = setup();
        let base = add(&conn, "a.example", "s");

        // Another writer bumps the record first
        record_contact(&conn, "a.example").unwrap();

        // A write against the stale base version must be rejected
        let value = serde_json::to_string(&base).unwrap();
        let err = kv::compare_and_set(
            &conn,
            &paths::peer_meta("a.example"),
            &value,
            base.version,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, KvError::VersionMismatch { .. }));
    }
}
