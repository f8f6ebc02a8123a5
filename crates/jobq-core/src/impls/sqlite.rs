//! SQLite store - durable, shareable across processes.
//!
//! One table of `key -> encoded job`. Every write transaction is
//! `BEGIN IMMEDIATE`, so it takes the database write lock up front: two pollers
//! (in this process or another one) can never read the same eligible job and
//! both claim it. Lock contention waits up to `busy_timeout` before failing.
//!
//! Read-only calls (`length`, `counts`, `get`, `dead_jobs`) use a deferred
//! transaction instead; under WAL they read a snapshot without queueing
//! behind a writer.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::{info, warn};

use crate::ports::{Store, StoreError, StoreTx};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS queue_jobs (
    key   TEXT PRIMARY KEY NOT NULL,
    value BLOB NOT NULL
) WITHOUT ROWID;
";

/// SQLite configuration options
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file path
    pub path: PathBuf,
    /// How long a transaction waits for another writer's lock
    pub busy_timeout: Duration,
    /// Enable WAL journal mode (readers do not block the writer)
    pub wal: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("jobq.db"),
            busy_timeout: Duration::from_secs(30),
            wal: true,
        }
    }
}

impl SqliteConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_config(SqliteConfig::new(path.as_ref()))
    }

    pub fn open_with_config(config: SqliteConfig) -> Result<Self, StoreError> {
        let conn = Connection::open(&config.path).map_err(|e| {
            StoreError::Connection(format!("open {}: {e}", config.path.display()))
        })?;
        let store = Self::init(conn, &config)?;
        info!(path = %config.path.display(), wal = config.wal, "sqlite store opened");
        Ok(store)
    }

    /// Private in-memory database (testing). Not shareable between stores.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Connection(format!("open in-memory: {e}")))?;
        let config = SqliteConfig {
            path: PathBuf::from(":memory:"),
            busy_timeout: Duration::from_secs(5),
            wal: false,
        };
        Self::init(conn, &config)
    }

    fn init(conn: Connection, config: &SqliteConfig) -> Result<Self, StoreError> {
        conn.busy_timeout(config.busy_timeout)
            .map_err(|e| StoreError::Connection(format!("busy_timeout: {e}")))?;

        if config.wal {
            let mode: String = conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
                .map_err(|e| StoreError::Connection(format!("journal_mode: {e}")))?;
            if !mode.eq_ignore_ascii_case("wal") {
                warn!(mode = %mode, "WAL journal mode unavailable, using fallback");
            }
        }

        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::Connection(format!("schema: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Store for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<R, E>,
        E: From<StoreError>,
    {
        self.run(TransactionBehavior::Immediate, f)
    }

    fn read<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<R, E>,
        E: From<StoreError>,
    {
        self.run(TransactionBehavior::Deferred, f)
    }
}

impl SqliteStore {
    fn run<R, E, F>(&self, behavior: TransactionBehavior, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<R, E>,
        E: From<StoreError>,
    {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn
            .transaction_with_behavior(behavior)
            .map_err(|e| StoreError::Query(format!("begin: {e}")))?;

        // Dropping `tx` without commit (early return or unwind) rolls back.
        let result = f(&mut SqliteTx { conn: &tx })?;

        tx.commit()
            .map_err(|e| StoreError::Query(format!("commit: {e}")))?;
        Ok(result)
    }
}

struct SqliteTx<'a> {
    conn: &'a Connection,
}

fn query_err(e: rusqlite::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

fn read_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, Vec<u8>)> {
    Ok((row.get(0)?, row.get(1)?))
}

impl StoreTx for SqliteTx<'_> {
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.conn
            .prepare_cached("SELECT value FROM queue_jobs WHERE key = ?1")
            .and_then(|mut stmt| stmt.query_row(params![key], |row| row.get(0)).optional())
            .map_err(query_err)
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.conn
            .prepare_cached(
                "INSERT INTO queue_jobs (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .and_then(|mut stmt| stmt.execute(params![key, value]))
            .map_err(query_err)?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool, StoreError> {
        let removed = self
            .conn
            .prepare_cached("DELETE FROM queue_jobs WHERE key = ?1")
            .and_then(|mut stmt| stmt.execute(params![key]))
            .map_err(query_err)?;
        Ok(removed > 0)
    }

    fn scan(
        &mut self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let entries = match after {
            Some(after) => {
                let mut stmt = self
                    .conn
                    .prepare_cached(
                        "SELECT key, value FROM queue_jobs WHERE key > ?1 ORDER BY key LIMIT ?2",
                    )
                    .map_err(query_err)?;
                let rows = stmt
                    .query_map(params![after, limit], read_entry)
                    .map_err(query_err)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(query_err)?;
                rows
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare_cached("SELECT key, value FROM queue_jobs ORDER BY key LIMIT ?1")
                    .map_err(query_err)?;
                let rows = stmt
                    .query_map(params![limit], read_entry)
                    .map_err(query_err)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(query_err)?;
                rows
            }
        };
        Ok(entries)
    }
}
