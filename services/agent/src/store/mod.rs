//! Persistence layer.
//!
//! One SQLite file shared by every task, opened in WAL mode so the six
//! processes can read and write concurrently. DAO functions take an
//! `impl SqliteExecutor<'_>`: pass the pool for a standalone query, or
//! `&mut *tx` for every query of a compound operation and commit once at
//! the end. Dropping an open transaction rolls it back.

mod error;
pub mod model;

pub mod events;
pub mod multi_results;
pub mod nonces;
pub mod old_params;
pub mod orchestrators;
pub mod requests;
pub mod results;
pub mod runs;
pub mod stats;

pub use error::StoreError;

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;
use tracing::info;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store file name inside the persistent directory.
pub const STORE_FILE: &str = "agent.db";

/// Every table the schema defines, in cleaning order.
pub const TABLES: &[&str] = &[
    "events",
    "multi_results",
    "nonces",
    "old_params",
    "orchestrators",
    "requests",
    "results",
    "runs",
    "stats",
    "tests",
];

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tests (
    id_test                 INTEGER PRIMARY KEY AUTOINCREMENT,
    name                    TEXT NOT NULL,
    description             TEXT NOT NULL,
    version                 INTEGER NOT NULL DEFAULT 1,
    state                   TEXT NOT NULL,
    created                 REAL NOT NULL,
    last_started_time       REAL,
    last_result_time        REAL,
    last_result_status      TEXT,
    last_downloaded_time    REAL,
    test_params             TEXT NOT NULL,
    timeout                 INTEGER NOT NULL,
    scheduling_interval     INTEGER,
    scheduling_from         REAL,
    scheduling_until        REAL,
    recovery_interval       INTEGER,
    recovery_attempt_limit  INTEGER,
    key_ro                  TEXT NOT NULL,
    key_rw                  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS requests (
    id_request        INTEGER PRIMARY KEY AUTOINCREMENT,
    id_test           INTEGER NOT NULL,
    reason            TEXT NOT NULL,
    recovery_attempt  INTEGER NOT NULL DEFAULT 0,
    added_time        REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
    id_event          INTEGER PRIMARY KEY AUTOINCREMENT,
    id_test           INTEGER NOT NULL,
    run_at            REAL NOT NULL,
    source            TEXT NOT NULL,
    recovery_attempt  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS runs (
    id_run            INTEGER PRIMARY KEY AUTOINCREMENT,
    id_test           INTEGER NOT NULL,
    version           INTEGER NOT NULL,
    state             TEXT NOT NULL,
    pid               INTEGER,
    planned           REAL NOT NULL,
    started           REAL,
    deadline          REAL,
    recovery_attempt  INTEGER NOT NULL DEFAULT 0
);

-- At most one waiting run per test, though the manager also checks before insert.
CREATE UNIQUE INDEX IF NOT EXISTS runs_one_waiting_per_test
    ON runs (id_test) WHERE state = 'waiting';

CREATE TABLE IF NOT EXISTS results (
    id_result         INTEGER PRIMARY KEY AUTOINCREMENT,
    id_test           INTEGER NOT NULL,
    version           INTEGER NOT NULL,
    planned           REAL NOT NULL,
    started           REAL NOT NULL,
    finished          REAL NOT NULL,
    status            TEXT NOT NULL,
    recovery_attempt  INTEGER NOT NULL DEFAULT 0,
    data              TEXT
);

CREATE TABLE IF NOT EXISTS old_params (
    id_old_params  INTEGER PRIMARY KEY AUTOINCREMENT,
    id_test        INTEGER NOT NULL,
    version        INTEGER NOT NULL,
    changed        REAL NOT NULL,
    test_params    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS multi_results (
    id_multi_result    INTEGER PRIMARY KEY AUTOINCREMENT,
    orchestrator_name  TEXT NOT NULL UNIQUE,
    test_ids           TEXT NOT NULL,
    key                TEXT NOT NULL,
    last_used_time     REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS orchestrators (
    id_orchestrator  INTEGER PRIMARY KEY AUTOINCREMENT,
    name             TEXT NOT NULL UNIQUE,
    last_seen        REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS nonces (
    id_nonce  INTEGER PRIMARY KEY AUTOINCREMENT,
    nonce     TEXT NOT NULL UNIQUE,
    used_at   REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS stats (
    id_stats    INTEGER PRIMARY KEY AUTOINCREMENT,
    time        REAL NOT NULL,
    table_name  TEXT NOT NULL,
    category    TEXT NOT NULL,
    value       INTEGER NOT NULL
);
"#;

/// Category -> count bag produced by the per-table counting operations.
///
/// Always carries an `"all"` total as the last entry.
#[derive(Debug, Clone)]
pub struct RecordCounts {
    pub categories: Vec<(String, i64)>,
}

impl RecordCounts {
    /// A bag for a table that only reports its total.
    pub fn single(total: i64) -> Self {
        Self {
            categories: vec![("all".to_string(), total)],
        }
    }

    /// A bag with one entry per category plus the computed total.
    pub fn with_categories(categories: Vec<(String, i64)>) -> Self {
        let total: i64 = categories.iter().map(|(_, count)| count).sum();
        let mut categories = categories;
        categories.push(("all".to_string(), total));
        Self { categories }
    }
}

/// Store connection pool wrapper.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open an existing store file.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        Self::connect(path, false).await
    }

    /// Open the store file, creating it when missing (`init_database`).
    pub async fn create(path: &Path) -> StoreResult<Self> {
        Self::connect(path, true).await
    }

    async fn connect(path: &Path, create_if_missing: bool) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(StoreError::Open)?;

        Ok(Self { pool })
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin an explicit transaction.
    pub async fn begin(&self) -> StoreResult<sqlx::Transaction<'_, sqlx::Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Create all tables and indexes.
    pub async fn init_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Store schema created");
        Ok(())
    }

    /// Verify that every required table exists.
    ///
    /// Missing tables are a global error: the task must not start against
    /// a store that was never initialized.
    pub async fn verify_schema(&self) -> StoreResult<()> {
        let rows = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table'")
            .fetch_all(&self.pool)
            .await?;
        let existing: Vec<String> = rows
            .iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<Result<_, _>>()?;

        for table in TABLES {
            if !existing.iter().any(|name| name == table) {
                return Err(StoreError::MissingTable((*table).to_string()));
            }
        }
        Ok(())
    }

    /// Count records in every table, as (table, counts) pairs.
    pub async fn count_all_tables(&self) -> StoreResult<Vec<(&'static str, RecordCounts)>> {
        Ok(vec![
            ("events", events::count(&self.pool).await?),
            ("multi_results", multi_results::count(&self.pool).await?),
            ("nonces", nonces::count(&self.pool).await?),
            ("old_params", old_params::count(&self.pool).await?),
            ("orchestrators", orchestrators::count(&self.pool).await?),
            ("requests", requests::count(&self.pool).await?),
            ("results", results::count(&self.pool).await?),
            ("runs", runs::count(&self.pool).await?),
            ("tests", tests::count(&self.pool).await?),
        ])
    }
}

#[cfg(test)]
mod store_tests {
    use super::*;

    #[tokio::test]
    async fn init_then_verify() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::create(&dir.path().join(STORE_FILE)).await.unwrap();
        store.init_schema().await.unwrap();
        store.verify_schema().await.unwrap();
    }

    #[tokio::test]
    async fn verify_fails_on_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::create(&dir.path().join(STORE_FILE)).await.unwrap();
        let err = store.verify_schema().await.unwrap_err();
        assert!(matches!(err, StoreError::MissingTable(_)));
    }

    #[test]
    fn counts_always_carry_a_total() {
        let single = RecordCounts::single(4);
        assert_eq!(single.categories, vec![("all".to_string(), 4)]);

        let bag = RecordCounts::with_categories(vec![
            ("success".to_string(), 2),
            ("error".to_string(), 3),
        ]);
        assert_eq!(bag.categories.last().unwrap(), &("all".to_string(), 5));
    }
}
