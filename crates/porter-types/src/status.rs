//! Peer and key lifecycle status enums.
//!
//! Transitions are encoded as methods so illegal moves are rejected in one
//! place rather than by string comparisons scattered through the store.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when parsing a status label from storage.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognized status label: {0}")]
pub struct StatusParseError(pub String);

/// Control-plane status of a peer record.
///
/// Distinct from the protocol-level [`crate::TrustTier`]: the store only ever
/// holds peers that have progressed far enough to have a record at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerStatus {
    /// Created but not yet approved; cannot authenticate.
    Pending,
    /// Approved; keys in good standing authenticate.
    Active,
    /// Terminal until re-established through a fresh introduction.
    Revoked,
}

impl PeerStatus {
    /// Whether a transition from `self` to `next` is legal.
    ///
    /// - `Pending → Active` (activation)
    /// - `Active → Pending` (soft downgrade)
    /// - any → `Revoked` (revocation is always legal)
    /// - `X → X` is legal (idempotent re-application)
    pub fn can_transition_to(self, next: PeerStatus) -> bool {
        match (self, next) {
            (a, b) if a == b => true,
            (_, PeerStatus::Revoked) => true,
            (PeerStatus::Pending, PeerStatus::Active) => true,
            (PeerStatus::Active, PeerStatus::Pending) => true,
            _ => false,
        }
    }

    /// Returns the storage label for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Revoked => "revoked",
        }
    }

    /// Parses a storage label back into a status.
    pub fn parse(s: &str) -> Result<Self, StatusParseError> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "revoked" => Ok(Self::Revoked),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

/// Status of a single credential within a peer's key set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    /// Valid for authentication.
    Active,
    /// Superseded by a rotation but still valid during the overlap window.
    Retiring,
    /// No longer valid.
    Revoked,
}

impl KeyStatus {
    /// Whether a key in this status may authenticate a request.
    pub fn authenticates(self) -> bool {
        matches!(self, Self::Active | Self::Retiring)
    }

    /// Returns the storage label for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Retiring => "retiring",
            Self::Revoked => "revoked",
        }
    }
}
