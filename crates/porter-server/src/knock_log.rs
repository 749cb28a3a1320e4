//! Append-only audit log of introduction attempts.
//!
//! One KV entry per knock under `knocks/{timestamp}-{suffix}`, expiring
//! after the configured retention window. Records are never mutated after
//! creation; reclaiming expired entries is the purge task's job.

use chrono::Utc;
use porter_db::{kv, KvError};
use porter_types::{KnockOutcome, TrustTier};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One audit entry. The upgrade token itself is never stored — only the
/// fact that one was offered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnockRecord {
    /// Source address the knock arrived from.
    pub source: String,
    /// Claimed sender domain, when the body yielded one.
    pub from: Option<String>,
    /// Claimed recipient domain, when the body yielded one.
    pub to: Option<String>,
    /// Referrer cited by the knocker, if any.
    pub referrer: Option<String>,
    /// Nonce carried by the knock, when present.
    pub nonce: Option<String>,
    /// Whether the knock was accepted or rejected.
    pub outcome: KnockOutcome,
    /// Rejection reason (`malformed`, `missing_fields`, `bad_timestamp`,
    /// `rate_limited`). `None` for accepted knocks.
    pub reason: Option<String>,
    /// Whether an upgrade token was present on the knock.
    pub upgrade_token_offered: bool,
    /// Whether the referrer named a peer that was active at the time.
    pub vouched: bool,
    /// Tier the knocking domain holds after this decision: `unknown` for
    /// rejections, `introduced` or `vouched` for accepted knocks.
    pub tier: TrustTier,
    /// When the knock was received (RFC 3339).
    pub received_at: String,
}

/// Appends one record with a TTL of `retention_days`.
pub fn append(
    conn: &Connection,
    record: &KnockRecord,
    retention_days: u32,
) -> Result<(), KvError> {
    let suffix = Uuid::new_v4().simple().to_string();
    let key = format!("knocks/{}-{}", record.received_at, &suffix[..8]);
    let ttl = u64::from(retention_days) * 86_400;
    let value = serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string());
    kv::insert(conn, &key, &value, Some(ttl))?;
    Ok(())
}

/// Returns the most recent records, newest first, up to `limit`.
pub fn recent(conn: &Connection, limit: usize) -> Result<Vec<KnockRecord>, KvError> {
    // Keys sort by timestamp, so the tail of the prefix listing is the
    // newest slice of the log.
    let entries = kv::list_prefix(conn, "knocks/")?;
    let mut records: Vec<KnockRecord> = entries
        .iter()
        .rev()
        .take(limit)
        .filter_map(|(_, entry)| serde_json::from_str(&entry.value).ok())
        .collect();
    // rev() already yields newest first; keep as-is.
    records.truncate(limit);
    Ok(records)
}

/// Builds a record timestamp in the key-sortable RFC 3339 form.
pub fn now_rfc3339() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
