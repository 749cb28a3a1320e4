//! Wire payloads for the knock and inbox protocols.

use serde::{Deserialize, Serialize};

/// An unauthenticated introduction request received on `POST /knock`.
///
/// Unknown fields are tolerated; missing required fields are surfaced as
/// `None` so the gateway can reject with a uniform outcome instead of a
/// deserialization error that would leak which field was wrong.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnockRequest {
    /// Must equal `"knock"`.
    #[serde(rename = "type")]
    pub message_type: Option<String>,
    /// Domain identity of the knocker.
    pub from: Option<String>,
    /// Domain identity of the intended recipient.
    pub to: Option<String>,
    /// UTC timestamp (RFC 3339); must lie within the gateway skew window.
    pub timestamp: Option<String>,
    /// Uniqueness token. Not globally deduplicated; replay defense is the
    /// timestamp window.
    pub nonce: Option<String>,
    /// Optional existing peer cited as having introduced the knocker.
    pub referrer: Option<String>,
    /// Optional free-form reason for the introduction.
    pub reason: Option<String>,
    /// Present only on the reciprocal knock of the three-step flow. Forwarded
    /// to the local hook, never persisted.
    pub upgrade_token: Option<String>,
}

impl KnockRequest {
    /// Whether all required fields are present and the type tag is correct.
    pub fn has_required_fields(&self) -> bool {
        self.message_type.as_deref() == Some("knock")
            && self.from.is_some()
            && self.to.is_some()
            && self.timestamp.is_some()
            && self.nonce.is_some()
    }
}

/// Outcome of a knock attempt, as recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnockOutcome {
    /// The knock passed validation and was forwarded.
    Accepted,
    /// The knock failed validation or was rate-limited.
    Rejected,
}

/// An authenticated message received on `POST /inbox`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxMessage {
    /// Domain identity of the sender; must name an active peer.
    pub from: Option<String>,
    /// Domain identity of the recipient.
    pub to: Option<String>,
    /// Message type tag, echoed back in the acknowledgment.
    #[serde(rename = "type")]
    pub message_type: Option<String>,
    /// Message body. Bounded length; interpretation belongs to the local
    /// agent, not the gateway.
    pub body: Option<String>,
    /// UTC timestamp (RFC 3339).
    pub timestamp: Option<String>,
    /// Uniqueness token.
    pub nonce: Option<String>,
}

/// Structured notification forwarded to the local-agent hook.
///
/// The gateway treats the payload as opaque: for knocks it carries the full
/// knock fields (including any upgrade token), for inbox messages the full
/// message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookNotification {
    /// Notification kind: `"knock"` or `"message"`.
    pub kind: String,
    /// Sender domain, when known.
    pub from: Option<String>,
    /// Recipient domain, when known.
    pub to: Option<String>,
    /// Whether the knock cited a referrer that is currently an active peer.
    /// Affects review priority only.
    #[serde(default)]
    pub vouched: bool,
    /// The full original payload.
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knock_required_fields() {
        let knock: KnockRequest = serde_json::from_str(
            r#"{"type":"knock","from":"a.example","to":"b.example",
                "timestamp":"2026-01-01T00:00:00Z","nonce":"n1"}"#,
        )
        .unwrap();
        assert!(knock.has_required_fields());
    }

    #[test]
    fn knock_missing_nonce_detected() {
        let knock: KnockRequest = serde_json::from_str(
            r#"{"type":"knock","from":"a.example","to":"b.example",
                "timestamp":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(!knock.has_required_fields());
    }

    #[test]
    fn knock_wrong_type_tag_detected() {
        let knock: KnockRequest = serde_json::from_str(
            r#"{"type":"hello","from":"a.example","to":"b.example",
                "timestamp":"2026-01-01T00:00:00Z","nonce":"n1"}"#,
        )
        .unwrap();
        assert!(!knock.has_required_fields());
    }

    #[test]
    fn knock_tolerates_unknown_fields() {
        let knock: KnockRequest = serde_json::from_str(
            r#"{"type":"knock","from":"a.example","to":"b.example",
                "timestamp":"2026-01-01T00:00:00Z","nonce":"n1",
                "surprise":"field"}"#,
        )
        .unwrap();
        assert!(knock.has_required_fields());
    }
}
