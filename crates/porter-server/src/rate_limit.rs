//! KV-backed sliding-window rate limiter.
//!
//! Hit timestamps live in an expiring KV entry per source, so the limit
//! holds across any number of gateway instances — there is no in-process
//! counter to diverge. This is an abuse deterrent, not a hard quota: under
//! a concurrent race from the same source an occasional request may land
//! slightly over the limit, which is acceptable.

use chrono::Utc;
use porter_db::{kv, KvError};
use rusqlite::Connection;

/// How many CAS attempts before falling back to a last-writer-wins append.
const CAS_ATTEMPTS: usize = 3;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Whether the request is admitted.
    pub admitted: bool,
    /// Slots left in the window after this decision.
    pub remaining: u32,
}

fn window_key(source_key: &str) -> String {
    format!("ratelimit/{source_key}")
}

fn parse_hits(value: &str) -> Vec<i64> {
    serde_json::from_str(value).unwrap_or_default()
}

/// Admits or denies one hit from `source_key` under a sliding window.
///
/// Reads the stored hit timestamps, discards entries older than
/// `window_seconds`, denies if the remainder is at capacity, otherwise
/// appends the current time and persists with a TTL equal to the window.
/// Pruning is by timestamp, not bucket boundary: a source that used all its
/// slots at minute 0 and minute 59 is still blocked at minute 60.
pub fn admit(
    conn: &Connection,
    source_key: &str,
    max_per_window: u32,
    window_seconds: u64,
) -> Result<Admission, KvError> {
    let key = window_key(source_key);
    let cutoff = Utc::now().timestamp() - window_seconds as i64;

    for _ in 0..CAS_ATTEMPTS {
        let now = Utc::now().timestamp();
        let existing = kv::get(conn, &key)?;

        let mut hits = existing
            .as_ref()
            .map(|e| parse_hits(&e.value))
            .unwrap_or_default();
        hits.retain(|&t| t > cutoff);

        if hits.len() >= max_per_window as usize {
            return Ok(Admission {
                admitted: false,
                remaining: 0,
            });
        }

        hits.push(now);
        let value = serde_json::to_string(&hits).unwrap_or_else(|_| "[]".to_string());
        let remaining = max_per_window - hits.len() as u32;

        let written = match existing {
            Some(entry) => {
                match kv::compare_and_set(conn, &key, &value, entry.version, Some(window_seconds)) {
                    Ok(_) => true,
                    Err(KvError::VersionMismatch { .. }) => false,
                    // Entry expired between read and write; retry as a fresh insert.
                    Err(KvError::NotFound(_)) => false,
                    Err(e) => return Err(e),
                }
            }
            None => match kv::insert(conn, &key, &value, Some(window_seconds)) {
                Ok(_) => true,
                Err(KvError::AlreadyExists(_)) => false,
                Err(e) => return Err(e),
            },
        };

        if written {
            return Ok(Admission {
                admitted: true,
                remaining,
            });
        }
        tracing::debug!(source_key, "rate window write raced, retrying");
    }

    // Contended source. Best-effort append keeps the deterrent working
    // without spinning; the worst case is one hit over the limit.
    let now = Utc::now().timestamp();
    let mut hits = kv::get(conn, &key)?
        .map(|e| parse_hits(&e.value))
        .unwrap_or_default();
    hits.retain(|&t| t > cutoff);
    if hits.len() >= max_per_window as usize {
        return Ok(Admission {
            admitted: false,
            remaining: 0,
        });
    }
    hits.push(now);
    let value = serde_json::to_string(&hits).unwrap_or_else(|_| "[]".to_string());
    let remaining = max_per_window - hits.len() as u32;
    kv::put(conn, &key, &value, Some(window_seconds))?;
    Ok(Admission {
        admitted: true,
        remaining,
    })
}
