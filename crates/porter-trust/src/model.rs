//! Peer and key records as stored in the KV backend.

use porter_types::{KeyStatus, PeerStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One remote agent relationship.
///
/// Stored as JSON under `peers/{peer_id}/meta`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Peer {
    /// Stable domain-identity string. Immutable once created.
    pub peer_id: String,
    /// Human label. Mutable.
    pub display_name: String,
    /// Ordered set of URLs where the peer can be reached.
    pub endpoints: Vec<String>,
    /// Control-plane lifecycle status.
    pub status: PeerStatus,
    /// Free-form operator metadata.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Free-form operator metadata, unconstrained values.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Timestamp of the most recent successful authenticated exchange.
    pub last_contact: Option<String>,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Last mutation timestamp (RFC 3339).
    pub updated_at: String,
    /// Generation counter for key ids. Bumped under the same CAS that
    /// serializes all peer mutations, so key ids are generation-ordered.
    #[serde(default)]
    pub key_seq: u64,
    /// Optimistic-concurrency version. Kept equal to the KV entry version:
    /// set before each write, overwritten from the entry on load.
    #[serde(default)]
    pub version: i64,
}

/// One credential associated with a peer.
///
/// Stored as JSON under `peers/{peer_id}/keys/{key_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerKey {
    /// Unique within the peer's key set, generation-ordered.
    pub key_id: String,
    /// Lowercase hex SHA-256 of the bearer secret. The raw secret is never
    /// persisted.
    pub credential_digest: String,
    /// Lifecycle status of this key.
    pub status: KeyStatus,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Optional hard expiry; an expired key never authenticates.
    pub expires_at: Option<String>,
    /// When the key entered `retiring` status, if it has.
    pub retired_at: Option<String>,
}

/// Parameters for [`crate::store::add_peer`].
#[derive(Debug, Clone)]
pub struct AddPeerRequest {
    /// Domain identity of the new peer.
    pub peer_id: String,
    /// Human label.
    pub display_name: String,
    /// Delivery endpoints.
    pub endpoints: Vec<String>,
    /// The initial bearer secret. Digested immediately; never stored.
    pub credential: String,
    /// Operator labels.
    pub labels: BTreeMap<String, String>,
    /// Operator annotations.
    pub annotations: BTreeMap<String, String>,
}

/// Result of a key rotation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct KeyRotation {
    /// The freshly minted active key.
    pub new_key_id: String,
    /// The key moved to `retiring`, when one was named.
    pub old_key_id: Option<String>,
    /// Whether an overlap window is now in effect: both keys authenticate
    /// until the retiring key is explicitly cleaned up.
    pub overlap_required: bool,
}

/// Reason a credential check failed.
///
/// Never exposed on the public surface — all invalid outcomes look identical
/// externally. Kept for the audit log and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// No peer record exists under the presented identity.
    UnknownPeer,
    /// The peer exists but is not in `active` status. Fails closed even if
    /// the presented secret matches a stored digest exactly.
    PeerNotActive,
    /// No live key digest matched the presented secret.
    NoMatchingKey,
}

/// Outcome of [`crate::store::validate_credential`].
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialCheck {
    /// The credential authenticated.
    Valid {
        /// The key that matched.
        key_id: String,
        /// Its status (`active` or `retiring`).
        key_status: KeyStatus,
    },
    /// The credential did not authenticate.
    Invalid {
        /// Why, for internal logging only.
        reason: InvalidReason,
    },
}

/// Why a peer showed up in a staleness report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StalenessReason {
    /// `last_contact` is older than the threshold.
    Stale,
    /// The peer has never completed an authenticated exchange.
    NeverContacted,
}

/// One row of a staleness report. Advisory only; producing it never mutates.
#[derive(Debug, Clone, Serialize)]
pub struct StalenessEntry {
    /// The active peer in question.
    pub peer: Peer,
    /// Whole days since last contact, when known.
    pub days_since_contact: Option<i64>,
    /// Why the peer is listed.
    pub reason: StalenessReason,
}
