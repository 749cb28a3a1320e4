//! Shared types, status enums, and wire payloads for the Porter gateway.
//!
//! This crate provides the foundational types used across all Porter crates:
//! the peer and key lifecycle enums (with typed transition checks), the
//! protocol-level trust tiers, the knock/inbox wire payloads, and the
//! gateway policy structure.
//!
//! No crate in the workspace depends on anything *except* `porter-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

use serde::{Deserialize, Serialize};

mod policy;
mod status;
mod wire;

pub use policy::{GatewayPolicy, KnockLimits};
pub use status::{KeyStatus, PeerStatus, StatusParseError};
pub use wire::{HookNotification, InboxMessage, KnockOutcome, KnockRequest};

/// Protocol-level trust tiers for a remote domain.
///
/// These are *derived* classifications, not stored peer state: the store only
/// persists [`PeerStatus`]. A domain that has knocked but was never admitted
/// is `Introduced`; a knock citing an active peer as referrer is `Vouched`
/// (queue priority only — vouching never changes an authentication outcome).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustTier {
    /// Never seen before.
    Unknown,
    /// Has knocked; awaiting human review.
    Introduced,
    /// Has knocked with a referrer that is an active peer.
    Vouched,
    /// Fully established: activated in the store with a live credential.
    Peer,
    /// Credential revoked. A fresh knock re-enters at `Introduced`.
    Revoked,
}

impl TrustTier {
    /// Tier a domain holds after a knock is decided: a rejected knock
    /// leaves it `Unknown`, an accepted one introduces it, and an active
    /// referrer upgrades the entry tier to `Vouched`.
    pub fn after_knock(accepted: bool, vouched: bool) -> Self {
        match (accepted, vouched) {
            (false, _) => Self::Unknown,
            (true, false) => Self::Introduced,
            (true, true) => Self::Vouched,
        }
    }

    /// Returns the wire label for this tier.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Introduced => "introduced",
            Self::Vouched => "vouched",
            Self::Peer => "peer",
            Self::Revoked => "revoked",
        }
    }
}
