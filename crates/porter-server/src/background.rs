//! Background task for purging expired store entries.

use porter_db::DbPool;
use std::time::Duration;
use tokio::time::sleep;

/// Starts a background task that periodically purges expired entries —
/// knock audit records past retention and rate-limit windows that have
/// closed. Reads already treat expired entries as absent; this reclaims
/// the space.
///
/// This task runs indefinitely.
pub async fn start_purge_task(pool: DbPool, interval_seconds: u64) {
    let interval = Duration::from_secs(interval_seconds);
    tracing::info!(interval_seconds, "starting expired-entry purge task");

    loop {
        // Sleep first so startup settles before the first sweep.
        sleep(interval).await;

        let pool_clone = pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let conn = pool_clone.get().map_err(|e| {
                porter_db::KvError::Sqlite(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
                    Some(format!("pool connection error: {}", e)),
                ))
            })?;
            porter_db::kv::purge_expired(&conn)
        })
        .await;

        match result {
            Ok(Ok(count)) => {
                if count > 0 {
                    tracing::info!(count, "purged expired entries");
                } else {
                    tracing::debug!("no expired entries to purge");
                }
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "failed to purge expired entries");
            }
            Err(e) => {
                tracing::error!(error = %e, "purge task panicked or was cancelled");
            }
        }
    }
}
