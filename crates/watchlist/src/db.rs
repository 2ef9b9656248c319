//! SQLite pool holding the durable watchlist records.

use crate::error::{ErrorKind, Result};
use crate::session::Session;
use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
/// Reconciliation writes go through one session at a time; extra connections
/// only serve reads that overlap with the sync engine.
const FILE_CONNECTIONS: u32 = 4;
/// Every connection to `:memory:` opens its own empty database.
const MEMORY_CONNECTIONS: u32 = 1;
/// The sync engine holds the write lock in short bursts.
const BUSY_TIMEOUT: Duration = Duration::from_millis(1500);

/// Connection pool for the watchlist record tables.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database file, creating its directory as needed,
    /// and bring the schema up to date.
    #[tracing::instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Database)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);
        Self::open(options, FILE_CONNECTIONS).await
    }

    /// A private database that disappears with the pool. Available outside
    /// `cfg(test)` so dependent crates can test against it.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().filename(":memory:");
        Self::open(options, MEMORY_CONNECTIONS).await
    }

    async fn open(options: SqliteConnectOptions, connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(connections)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        MIGRATOR.run(&pool).await.or_raise(|| ErrorKind::Migration)?;
        Ok(Self { pool })
    }

    /// Start a batch of record changes.
    ///
    /// Nothing is visible to other connections until
    /// [`commit`](crate::RecordStore::commit); dropping the session rolls
    /// everything back.
    pub async fn begin(&self) -> Result<Session> {
        let transaction = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        Ok(Session::new(transaction))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for checked-out connections to come back, then close them.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
