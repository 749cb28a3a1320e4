//! Storage layer for the Porter gateway.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! embedded SQL migrations, and the atomic key-value interface every other
//! crate persists through. Peers, keys, knock audit records, and rate-limit
//! windows are all independently addressable KV entries under namespaced
//! keys — no caller touches tables directly.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: no external database process required. WAL
//!   allows concurrent readers with a single writer, which matches the
//!   gateway access pattern.
//! - **`r2d2` connection pool**: bounded connection reuse without manual
//!   lifetime management.
//! - **Versioned compare-and-set**: every entry carries a monotonically
//!   increasing version. Conditional updates are a single SQL statement, so
//!   the check and the write are atomic relative to the backend rather than
//!   a read-then-write in application code.
//! - **Entry-level expiry**: entries may carry an `expires_at`; expired
//!   entries are invisible to reads and reclaimed by an explicit purge.

pub mod kv;
mod migrations;
mod pool;

pub use kv::{KvEntry, KvError};
pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
