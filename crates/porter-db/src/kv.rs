//! Atomic key-value operations over the `kv_entries` table.
//!
//! All mutating operations are single SQL statements, so the version check
//! and the write in [`compare_and_set`] are indivisible relative to the
//! backend. Expired entries are invisible to every read path and are
//! physically removed by [`purge_expired`], which callers invoke from a
//! background task.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

/// Errors surfaced by KV operations.
#[derive(Debug, Error)]
pub enum KvError {
    /// No live entry exists under the key.
    #[error("no entry for key: {0}")]
    NotFound(String),

    /// An insert hit a live entry under the same key.
    #[error("entry already exists for key: {0}")]
    AlreadyExists(String),

    /// A compare-and-set lost against a concurrent writer.
    #[error("version mismatch for key {key}: expected {expected}")]
    VersionMismatch {
        /// The key whose write collided.
        key: String,
        /// The version the caller read before modifying.
        expected: i64,
    },

    /// The underlying SQLite operation failed.
    #[error("storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// A live entry read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    /// The stored value (callers keep JSON here).
    pub value: String,
    /// Current optimistic-concurrency version.
    pub version: i64,
}

fn now_rfc3339() -> String {
    format_rfc3339(Utc::now())
}

/// Second-precision RFC 3339 so stored timestamps compare lexicographically.
fn format_rfc3339(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn expiry_from_ttl(ttl_seconds: Option<u64>) -> Option<String> {
    ttl_seconds.map(|s| format_rfc3339(Utc::now() + Duration::seconds(s as i64)))
}

/// Reads the live entry under `key`. Expired entries read as absent.
pub fn get(conn: &Connection, key: &str) -> Result<Option<KvEntry>, KvError> {
    let now = now_rfc3339();
    let entry = conn
        .query_row(
            "SELECT value, version FROM kv_entries
             WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
            params![key, now],
            |row| {
                Ok(KvEntry {
                    value: row.get(0)?,
                    version: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(entry)
}

/// Creates a new entry. Fails with [`KvError::AlreadyExists`] if a live
/// entry is present; a lingering expired row under the same key is replaced.
///
/// Returns the initial version (always 1).
pub fn insert(
    conn: &Connection,
    key: &str,
    value: &str,
    ttl_seconds: Option<u64>,
) -> Result<i64, KvError> {
    let now = now_rfc3339();
    let expires_at = expiry_from_ttl(ttl_seconds);

    // Reclaim an expired row so it does not block the insert.
    conn.execute(
        "DELETE FROM kv_entries WHERE key = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2",
        params![key, now],
    )?;

    let changed = conn.execute(
        "INSERT INTO kv_entries (key, value, version, expires_at, created_at, updated_at)
         VALUES (?1, ?2, 1, ?3, ?4, ?4)
         ON CONFLICT(key) DO NOTHING",
        params![key, value, expires_at, now],
    )?;

    if changed == 0 {
        return Err(KvError::AlreadyExists(key.to_string()));
    }
    Ok(1)
}

/// Atomically replaces the entry under `key` if and only if its version
/// still equals `expected_version`. Returns the new version on success.
///
/// # Errors
///
/// [`KvError::VersionMismatch`] if a concurrent writer got there first;
/// [`KvError::NotFound`] if no live entry exists.
pub fn compare_and_set(
    conn: &Connection,
    key: &str,
    value: &str,
    expected_version: i64,
    ttl_seconds: Option<u64>,
) -> Result<i64, KvError> {
    let now = now_rfc3339();
    let expires_at = expiry_from_ttl(ttl_seconds);

    let changed = conn.execute(
        "UPDATE kv_entries
         SET value = ?1, version = version + 1, expires_at = ?2, updated_at = ?3
         WHERE key = ?4 AND version = ?5
           AND (expires_at IS NULL OR expires_at > ?3)",
        params![value, expires_at, now, key, expected_version],
    )?;

    if changed == 1 {
        return Ok(expected_version + 1);
    }

    // Distinguish a lost race from a missing entry for the caller's retry
    // decision. A second read is fine here: the CAS itself already failed.
    match get(conn, key)? {
        Some(_) => Err(KvError::VersionMismatch {
            key: key.to_string(),
            expected: expected_version,
        }),
        None => Err(KvError::NotFound(key.to_string())),
    }
}

/// Unconditional upsert. Bumps the version if the entry exists.
///
/// Used where last-writer-wins is acceptable (rate-limit windows); the trust
/// store never uses this for peer state.
pub fn put(
    conn: &Connection,
    key: &str,
    value: &str,
    ttl_seconds: Option<u64>,
) -> Result<(), KvError> {
    let now = now_rfc3339();
    let expires_at = expiry_from_ttl(ttl_seconds);

    conn.execute(
        "INSERT INTO kv_entries (key, value, version, expires_at, created_at, updated_at)
         VALUES (?1, ?2, 1, ?3, ?4, ?4)
         ON CONFLICT(key) DO UPDATE SET
             value = excluded.value,
             version = kv_entries.version + 1,
             expires_at = excluded.expires_at,
             updated_at = excluded.updated_at",
        params![key, value, expires_at, now],
    )?;
    Ok(())
}

/// Deletes the entry under `key`. Returns whether a row was removed.
pub fn delete(conn: &Connection, key: &str) -> Result<bool, KvError> {
    let changed = conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
    Ok(changed > 0)
}

/// Lists live entries whose key starts with `prefix`, ordered by key.
///
/// The listing is a snapshot: restartable, finite, and not guaranteed stable
/// across calls while writers are active.
pub fn list_prefix(conn: &Connection, prefix: &str) -> Result<Vec<(String, KvEntry)>, KvError> {
    let now = now_rfc3339();
    // Escape LIKE metacharacters so a prefix containing % or _ stays literal.
    let escaped = prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    let pattern = format!("{escaped}%");

    let mut stmt = conn.prepare(
        "SELECT key, value, version FROM kv_entries
         WHERE key LIKE ?1 ESCAPE '\\' AND (expires_at IS NULL OR expires_at > ?2)
         ORDER BY key",
    )?;
    let rows = stmt.query_map(params![pattern, now], |row| {
        Ok((
            row.get::<_, String>(0)?,
            KvEntry {
                value: row.get(1)?,
                version: row.get(2)?,
            },
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

/// Physically removes expired entries. Returns the number removed.
pub fn purge_expired(conn: &Connection) -> Result<usize, KvError> {
    let now = now_rfc3339();
    let removed = conn.execute(
        "DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
        params![now],
    )?;
    Ok(removed)
}
