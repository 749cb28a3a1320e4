//! SQLite connection pool for the key-value store.
//!
//! All Porter state lives in one KV table, so the pool asks very little of
//! SQLite: WAL so readers run alongside the single writer, a busy timeout
//! so blocked writers queue instead of erroring, and `synchronous=NORMAL`,
//! which WAL makes safe for this workload.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use thiserror::Error;

/// Runtime tunables for the SQLite pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a blocked writer waits on the database lock, in
    /// milliseconds, before surfacing `SQLITE_BUSY`.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

/// A type alias for the SQLite connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Errors that can occur when creating the database pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Failed to build the connection pool.
    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Creates the pool, applying the pragmas above to every connection.
///
/// `:memory:` is accepted for single-connection tests only: each pooled
/// connection to `:memory:` opens its own private database, so nothing
/// written through one connection is visible through another.
///
/// # Errors
///
/// Returns `PoolError::PoolInit` if the connection pool cannot be created.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| {
            // The WAL switch has to be verified: SQLite keeps the previous
            // journal mode on failure without raising an error. In-memory
            // databases report "memory", which is fine.
            let journal_mode: String =
                conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
            if !matches!(journal_mode.as_str(), "wal" | "memory") {
                return Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                    Some(format!("journal mode is {journal_mode}, not wal")),
                ));
            }
            conn.pragma_update(None, "busy_timeout", settings.busy_timeout_ms)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
        });

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .build(manager)?;

    Ok(pool)
}
