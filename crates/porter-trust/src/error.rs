//! Error type for trust store operations.

use porter_db::KvError;
use porter_types::PeerStatus;
use thiserror::Error;

/// Errors surfaced by the Peer Trust Store.
#[derive(Debug, Error)]
pub enum TrustStoreError {
    /// No peer exists under the given identity.
    #[error("unknown peer: {0}")]
    NotFound(String),

    /// A peer already exists under the given identity.
    #[error("peer already exists: {0}")]
    AlreadyExists(String),

    /// A mutation lost the compare-and-set race on every attempt. The caller
    /// should re-read and retry the whole operation.
    #[error("concurrent write conflict on peer: {0}")]
    Conflict(String),

    /// The requested status change is not a legal transition.
    #[error("illegal transition: {from:?} -> {to:?}")]
    IllegalTransition {
        /// Status the peer is currently in.
        from: PeerStatus,
        /// Status the caller asked for.
        to: PeerStatus,
    },

    /// The peer identity is not a usable domain-identity string.
    #[error("invalid peer id: {0}")]
    InvalidPeerId(String),

    /// The referenced key does not exist on this peer.
    #[error("unknown key {key_id} on peer {peer_id}")]
    UnknownKey {
        /// The peer that was addressed.
        peer_id: String,
        /// The key id that was not found.
        key_id: String,
    },

    /// A stored record failed to (de)serialize. Indicates corruption or a
    /// version skew, never normal operation.
    #[error("corrupt stored record: {0}")]
    Codec(#[from] serde_json::Error),

    /// The KV backend failed.
    #[error(transparent)]
    Kv(#[from] KvError),
}
