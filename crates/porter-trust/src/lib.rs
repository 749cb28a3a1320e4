//! Peer Trust Store.
//!
//! Owns every peer and key record in the Porter KV backend and is the only
//! component allowed to mutate peer or key status. Operations enforce the
//! trust state machine: illegal transitions are rejected by the typed status
//! enums before any write happens, and every mutation goes through a bounded
//! compare-and-set retry on the peer's meta record so concurrent callers on
//! the same `peer_id` can never silently overwrite one another.
//!
//! Credential handling is write-once-digest: the raw bearer secret enters
//! exactly one function ([`store::add_peer`] / [`store::rotate_key`] /
//! [`store::validate_credential`]) and only its SHA-256 digest is ever
//! persisted or compared (in constant time).

mod digest;
mod error;
mod model;
mod paths;
pub mod store;

pub use digest::credential_digest;
pub use error::TrustStoreError;
pub use model::{
    AddPeerRequest, CredentialCheck, InvalidReason, KeyRotation, Peer, PeerKey, StalenessEntry,
    StalenessReason,
};
